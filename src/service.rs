//! Reconciliation driver.
//!
//! Ties the firewall store and the source providers to the reconciler:
//! read the firewall, gather sources, compute the new rule set, then
//! either log it (dry-run) or submit it as a full replacement.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregator::{aggregate, count_by_family};
use crate::error::{AllowlistError, Result};
use crate::firewall::FirewallStore;
use crate::reconciler::{reconcile_bulk, reconcile_single_ip, UpsertAction, UpsertMode};
use crate::retry::RetryPolicy;
use crate::rules::{FirewallSnapshot, InboundRule, ManagedRule, Protocol};
use crate::sources::{collect, fetch_all, SourceProvider};
use crate::validation::{normalize, validate_port};

/// Result of a bulk reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The rule set was written to the firewall
    Submitted { inbound_rules: Vec<InboundRule>, sources: usize },
    /// The rule set that would have been written
    DryRun { inbound_rules: Vec<InboundRule>, sources: usize },
}

impl Outcome {
    pub fn inbound_rules(&self) -> &[InboundRule] {
        match self {
            Outcome::Submitted { inbound_rules, .. } | Outcome::DryRun { inbound_rules, .. } => inbound_rules,
        }
    }
}

/// Result of a single-address upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub action: UpsertAction,
    pub source: String,
    pub port: u16,
    pub submitted: bool,
    pub inbound_rules: Vec<InboundRule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Ok,
    Error,
    Disabled,
}

#[derive(Debug, Clone, Serialize)]
pub struct FirewallStatus {
    pub id: String,
    pub status: Health,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inbound_rules: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub status: Health,
    pub ipv4: usize,
    pub ipv6: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Point-in-time view of every collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub timestamp: String,
    pub firewall: FirewallStatus,
    pub managed_ports: Vec<String>,
    pub sources: Vec<SourceStatus>,
}

impl ServiceStatus {
    pub fn is_healthy(&self) -> bool {
        self.firewall.status == Health::Ok && self.sources.iter().all(|s| s.status != Health::Error)
    }
}

pub struct Allowlister {
    firewall_id: String,
    store: Box<dyn FirewallStore>,
    providers: Vec<Box<dyn SourceProvider>>,
    /// Providers that exist but are switched off, reported in status only
    disabled: Vec<&'static str>,
    managed: Vec<(Protocol, u16)>,
    retry: RetryPolicy,
}

impl Allowlister {
    pub fn new(
        firewall_id: impl Into<String>,
        store: Box<dyn FirewallStore>,
        providers: Vec<Box<dyn SourceProvider>>,
        managed: Vec<(Protocol, u16)>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            firewall_id: firewall_id.into(),
            store,
            providers,
            disabled: Vec::new(),
            managed,
            retry,
        }
    }

    pub fn with_disabled(mut self, disabled: Vec<&'static str>) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn firewall_id(&self) -> &str {
        &self.firewall_id
    }

    async fn snapshot(&self) -> Result<FirewallSnapshot> {
        self.retry
            .run("Reading firewall", || self.store.get_snapshot(&self.firewall_id))
            .await
    }

    async fn submit(&self, snapshot: &FirewallSnapshot, inbound_rules: &[InboundRule]) -> Result<()> {
        self.retry
            .run("Updating firewall", || {
                self.store
                    .submit(&self.firewall_id, &snapshot.name, inbound_rules, &snapshot.passthrough)
            })
            .await
    }

    /// Reconcile every managed port against the current source lists.
    pub async fn run(&self, dry_run: bool) -> Result<Outcome> {
        let firewall_id = self.firewall_id.as_str();
        if self.managed.is_empty() {
            warn!(firewall_id, "No inbound rules configured, only unmanaged rules will be submitted");
        }

        let snapshot = self.snapshot().await?;
        info!(
            firewall_id,
            "Firewall '{}' has {} inbound rules",
            snapshot.name,
            snapshot.inbound_rules.len()
        );

        let lists = collect(&self.providers, &self.retry).await?;
        let sources = aggregate(&lists);
        if sources.is_empty() {
            return Err(AllowlistError::NoSources);
        }
        let (v4, v6) = count_by_family(&sources);
        info!("Collected {} sources ({} IPv4, {} IPv6)", sources.len(), v4, v6);

        let desired: Vec<ManagedRule> = self
            .managed
            .iter()
            .map(|(protocol, port)| ManagedRule::new(*protocol, *port, sources.iter().cloned()))
            .collect();
        let inbound_rules = reconcile_bulk(&snapshot, &desired)?;

        if dry_run {
            info!(firewall_id, "[DRY-RUN] Would submit {} inbound rules:", inbound_rules.len());
            for rule in &inbound_rules {
                info!("[DRY-RUN]   {}", rule);
            }
            return Ok(Outcome::DryRun {
                inbound_rules,
                sources: sources.len(),
            });
        }

        for rule in &inbound_rules {
            debug!("  {}", rule);
        }
        self.submit(&snapshot, &inbound_rules).await?;
        info!(firewall_id, "Submitted {} inbound rules", inbound_rules.len());

        Ok(Outcome::Submitted {
            inbound_rules,
            sources: sources.len(),
        })
    }

    /// Allow one address on a TCP port.
    ///
    /// Port and address are validated before the firewall is read.
    /// Nothing is submitted when the address is already allowed.
    pub async fn allow_address(&self, address: &str, port: i64, mode: UpsertMode, dry_run: bool) -> Result<UpsertOutcome> {
        let firewall_id = self.firewall_id.as_str();
        let port = validate_port(port)?;
        normalize(address)?;

        let snapshot = self.snapshot().await?;
        let upsert = reconcile_single_ip(&snapshot, port.into(), address, mode)?;

        let mut outcome = UpsertOutcome {
            action: upsert.action,
            source: upsert.source,
            port,
            submitted: false,
            inbound_rules: upsert.inbound_rules,
        };

        if upsert.rebuilt {
            warn!(
                firewall_id,
                port, "tcp/{} rule had non-address sources; it is rewritten with addresses only", port
            );
        }

        match outcome.action {
            UpsertAction::NoOp => {
                info!(firewall_id, port, "{} is already allowed on tcp/{}", outcome.source, port);
                return Ok(outcome);
            }
            UpsertAction::CreateNew => info!(firewall_id, port, "Creating tcp/{} rule for {}", port, outcome.source),
            UpsertAction::Append => info!(firewall_id, port, "Adding {} to tcp/{}", outcome.source, port),
            UpsertAction::ReplaceSources => warn!(
                firewall_id,
                port,
                "Replacing every source on tcp/{} with {}",
                port,
                outcome.source
            ),
        }

        if dry_run {
            info!(firewall_id, "[DRY-RUN] Would submit {} inbound rules:", outcome.inbound_rules.len());
            for rule in &outcome.inbound_rules {
                info!("[DRY-RUN]   {}", rule);
            }
            return Ok(outcome);
        }

        self.submit(&snapshot, &outcome.inbound_rules).await?;
        outcome.submitted = true;
        info!(firewall_id, port, "Firewall updated");
        Ok(outcome)
    }

    /// One unretried read of the firewall and one fetch per provider.
    pub async fn status(&self) -> ServiceStatus {
        let firewall = match self.store.get_snapshot(&self.firewall_id).await {
            Ok(snapshot) => FirewallStatus {
                id: self.firewall_id.clone(),
                status: Health::Ok,
                name: Some(snapshot.name),
                inbound_rules: Some(snapshot.inbound_rules.len()),
                error: None,
            },
            Err(e) => FirewallStatus {
                id: self.firewall_id.clone(),
                status: Health::Error,
                name: None,
                inbound_rules: None,
                error: Some(e.to_string()),
            },
        };

        let mut sources: Vec<SourceStatus> = fetch_all(&self.providers, &RetryPolicy::none())
            .await
            .into_iter()
            .map(|r| match r.result {
                Ok(list) => {
                    let (ipv4, ipv6) = count_by_family(&list);
                    SourceStatus {
                        name: r.provider.to_string(),
                        status: Health::Ok,
                        ipv4,
                        ipv6,
                        error: None,
                    }
                }
                Err(e) => SourceStatus {
                    name: r.provider.to_string(),
                    status: Health::Error,
                    ipv4: 0,
                    ipv6: 0,
                    error: Some(e.to_string()),
                },
            })
            .collect();
        sources.extend(self.disabled.iter().map(|name| SourceStatus {
            name: name.to_string(),
            status: Health::Disabled,
            ipv4: 0,
            ipv6: 0,
            error: None,
        }));

        ServiceStatus {
            timestamp: Utc::now().to_rfc3339(),
            firewall,
            managed_ports: self
                .managed
                .iter()
                .map(|(protocol, port)| format!("{}/{}", protocol, port))
                .collect(),
            sources,
        }
    }

    /// Check that the firewall is readable and at least one provider answers.
    pub async fn check_connectivity(&self) -> Result<ServiceStatus> {
        let status = self.status().await;

        if let Some(ref message) = status.firewall.error {
            return Err(AllowlistError::StoreFetchFailed {
                firewall_id: self.firewall_id.clone(),
                message: message.clone(),
            });
        }

        let enabled: Vec<&SourceStatus> = status.sources.iter().filter(|s| s.status != Health::Disabled).collect();
        if !enabled.is_empty() && enabled.iter().all(|s| s.status == Health::Error) {
            return Err(AllowlistError::AllProvidersFailed(enabled.len()));
        }
        for source in enabled.iter().filter(|s| s.status == Health::Error) {
            warn!(
                provider = source.name.as_str(),
                "{} is unreachable: {}",
                source.name,
                source.error.as_deref().unwrap_or("unknown error")
            );
        }

        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firewall::mock::MemoryStore;
    use crate::rules::{OpaqueRule, Passthrough};
    use crate::sources::MockSourceProvider;
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    /// Lets a test keep a handle on the store after handing it to the driver.
    struct Shared(Arc<MemoryStore>);

    #[async_trait::async_trait]
    impl FirewallStore for Shared {
        async fn get_snapshot(&self, firewall_id: &str) -> Result<FirewallSnapshot> {
            self.0.get_snapshot(firewall_id).await
        }

        async fn submit(
            &self,
            firewall_id: &str,
            name: &str,
            inbound_rules: &[InboundRule],
            passthrough: &Passthrough,
        ) -> Result<()> {
            self.0.submit(firewall_id, name, inbound_rules, passthrough).await
        }
    }

    fn snapshot() -> FirewallSnapshot {
        FirewallSnapshot {
            id: "fw-1".to_string(),
            name: "edge".to_string(),
            inbound_rules: vec![
                ManagedRule::new(Protocol::Tcp, 22, ["1.2.3.4/32"]).into(),
                ManagedRule::new(Protocol::Tcp, 443, ["0.0.0.0/0"]).into(),
                InboundRule::Opaque(OpaqueRule {
                    protocol: "tcp".to_string(),
                    ports: "8000-9000".to_string(),
                    raw: json!({ "protocol": "tcp", "ports": "8000-9000", "sources": { "tags": ["web"] } }),
                }),
            ],
            passthrough: Passthrough {
                outbound_rules: vec![json!({ "protocol": "tcp", "ports": "all" })],
                tags: vec!["prod".to_string()],
                droplet_ids: vec![7],
            },
        }
    }

    fn provider(name: &'static str, ips: &[&str]) -> Box<dyn SourceProvider> {
        let ips: Vec<String> = ips.iter().map(|s| s.to_string()).collect();
        let mut mock = MockSourceProvider::new();
        mock.expect_name().return_const(name);
        mock.expect_fetch().returning(move || Ok(ips.clone()));
        Box::new(mock)
    }

    fn failing(name: &'static str) -> Box<dyn SourceProvider> {
        let mut mock = MockSourceProvider::new();
        mock.expect_name().return_const(name);
        mock.expect_fetch()
            .returning(move || Err(AllowlistError::provider(name, "timed out")));
        Box::new(mock)
    }

    fn driver(store: &Arc<MemoryStore>, providers: Vec<Box<dyn SourceProvider>>) -> Allowlister {
        Allowlister::new(
            "fw-1",
            Box::new(Shared(store.clone())),
            providers,
            vec![(Protocol::Tcp, 443)],
            RetryPolicy::none().max_attempts(2),
        )
    }

    #[tokio::test]
    async fn test_run_submits_reconciled_rules() {
        let store = Arc::new(MemoryStore::new(snapshot()));
        let allowlister = driver(
            &store,
            vec![
                provider("cloudflare", &["173.245.48.0/20", "2400:cb00::/32"]),
                provider("netdata", &["10.0.0.1", "173.245.48.0/20"]),
            ],
        );

        let outcome = allowlister.run(false).await.unwrap();

        let expected: Vec<InboundRule> = vec![
            snapshot().inbound_rules[0].clone(),
            snapshot().inbound_rules[2].clone(),
            ManagedRule::new(
                Protocol::Tcp,
                443,
                ["173.245.48.0/20", "2400:cb00::/32", "10.0.0.1/32"],
            )
            .into(),
        ];
        assert_eq!(
            outcome,
            Outcome::Submitted {
                inbound_rules: expected.clone(),
                sources: 3
            }
        );
        assert_eq!(store.last_submission(), Some(expected));
        assert_eq!(
            store.submitted_passthrough.lock().unwrap()[0],
            snapshot().passthrough
        );
    }

    #[tokio::test]
    async fn test_run_twice_is_stable() {
        let store = Arc::new(MemoryStore::new(snapshot()));
        let allowlister = driver(&store, vec![provider("cloudflare", &["1.1.1.0/24"])]);

        let first = allowlister.run(false).await.unwrap();
        let second = allowlister.run(false).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.submission_count(), 2);
    }

    #[tokio::test]
    async fn test_dry_run_does_not_submit() {
        let store = Arc::new(MemoryStore::new(snapshot()));
        let allowlister = driver(&store, vec![provider("cloudflare", &["1.1.1.0/24"])]);

        let outcome = allowlister.run(true).await.unwrap();
        assert!(matches!(outcome, Outcome::DryRun { sources: 1, .. }));
        assert_eq!(outcome.inbound_rules().len(), 3);
        assert_eq!(store.submission_count(), 0);
        assert_eq!(store.gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_refuses_empty_sources() {
        let store = Arc::new(MemoryStore::new(snapshot()));
        let allowlister = driver(&store, vec![provider("cloudflare", &[])]);

        let err = allowlister.run(false).await.unwrap_err();
        assert!(matches!(err, AllowlistError::NoSources));
        assert_eq!(store.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_run_partial_provider_failure() {
        let store = Arc::new(MemoryStore::new(snapshot()));
        let allowlister = driver(
            &store,
            vec![failing("cloudflare"), provider("netdata", &["10.0.0.1"])],
        );

        let outcome = allowlister.run(false).await.unwrap();
        assert_eq!(
            outcome.inbound_rules().last(),
            Some(&ManagedRule::new(Protocol::Tcp, 443, ["10.0.0.1/32"]).into())
        );
    }

    #[tokio::test]
    async fn test_run_all_providers_failed() {
        let store = Arc::new(MemoryStore::new(snapshot()));
        let allowlister = driver(&store, vec![failing("cloudflare"), failing("netdata")]);

        let err = allowlister.run(false).await.unwrap_err();
        assert!(matches!(err, AllowlistError::AllProvidersFailed(2)));
        assert_eq!(store.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_run_invalid_provider_address() {
        let store = Arc::new(MemoryStore::new(snapshot()));
        let allowlister = driver(&store, vec![provider("netdata", &["10.0.0.1", "bogus"])]);

        let err = allowlister.run(false).await.unwrap_err();
        assert!(matches!(err, AllowlistError::InvalidAddress(ref s) if s == "bogus"));
        assert_eq!(store.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_run_retries_store_read() {
        let store = Arc::new(MemoryStore::new(snapshot()));
        store.fail_gets.store(1, Ordering::SeqCst);
        let allowlister = driver(&store, vec![provider("cloudflare", &["1.1.1.0/24"])]);

        allowlister.run(false).await.unwrap();
        assert_eq!(store.gets.load(Ordering::SeqCst), 2);
        assert_eq!(store.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_run_submit_failure_surfaces() {
        let store = Arc::new(MemoryStore::new(snapshot()));
        store.fail_submits.store(5, Ordering::SeqCst);
        let allowlister = driver(&store, vec![provider("cloudflare", &["1.1.1.0/24"])]);

        let err = allowlister.run(false).await.unwrap_err();
        assert!(matches!(err, AllowlistError::StoreSubmitFailed { ref firewall_id, .. } if firewall_id == "fw-1"));
        assert_eq!(store.submission_count(), 0);
        assert_eq!(*store.snapshot.lock().unwrap(), snapshot());
    }

    #[tokio::test]
    async fn test_allow_address_appends() {
        let store = Arc::new(MemoryStore::new(snapshot()));
        let allowlister = driver(&store, vec![]);

        let outcome = allowlister
            .allow_address("6.6.6.6", 22, UpsertMode::Append, false)
            .await
            .unwrap();
        assert_eq!(outcome.action, UpsertAction::Append);
        assert!(outcome.submitted);
        assert_eq!(
            store.last_submission().unwrap()[0],
            ManagedRule::new(Protocol::Tcp, 22, ["1.2.3.4/32", "6.6.6.6/32"]).into()
        );
    }

    #[tokio::test]
    async fn test_allow_address_noop_skips_submit() {
        let store = Arc::new(MemoryStore::new(snapshot()));
        let allowlister = driver(&store, vec![]);

        let outcome = allowlister
            .allow_address("1.2.3.4", 22, UpsertMode::Append, false)
            .await
            .unwrap();
        assert_eq!(outcome.action, UpsertAction::NoOp);
        assert!(!outcome.submitted);
        assert_eq!(store.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_allow_address_replace_dry_run() {
        let store = Arc::new(MemoryStore::new(snapshot()));
        let allowlister = driver(&store, vec![]);

        let outcome = allowlister
            .allow_address("6.6.6.6", 22, UpsertMode::Replace, true)
            .await
            .unwrap();
        assert_eq!(outcome.action, UpsertAction::ReplaceSources);
        assert!(!outcome.submitted);
        assert_eq!(
            outcome.inbound_rules[0],
            ManagedRule::new(Protocol::Tcp, 22, ["6.6.6.6/32"]).into()
        );
        assert_eq!(store.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_allow_address_validates_before_reading() {
        let store = Arc::new(MemoryStore::new(snapshot()));
        let allowlister = driver(&store, vec![]);

        let err = allowlister
            .allow_address("6.6.6.6", 0, UpsertMode::Append, false)
            .await
            .unwrap_err();
        assert!(matches!(err, AllowlistError::InvalidPort(0)));

        let err = allowlister
            .allow_address("six", 22, UpsertMode::Append, false)
            .await
            .unwrap_err();
        assert!(matches!(err, AllowlistError::InvalidAddress(_)));

        assert_eq!(store.gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_status_reports_collaborators() {
        let store = Arc::new(MemoryStore::new(snapshot()));
        let allowlister = driver(
            &store,
            vec![
                provider("cloudflare", &["173.245.48.0/20", "2400:cb00::/32"]),
                failing("public-ip"),
            ],
        )
        .with_disabled(vec!["netdata"]);

        let status = allowlister.status().await;
        assert_eq!(status.firewall.status, Health::Ok);
        assert_eq!(status.firewall.name.as_deref(), Some("edge"));
        assert_eq!(status.firewall.inbound_rules, Some(3));
        assert_eq!(status.managed_ports, vec!["tcp/443"]);
        assert_eq!(status.sources.len(), 3);
        assert_eq!((status.sources[0].ipv4, status.sources[0].ipv6), (1, 1));
        assert_eq!(status.sources[1].status, Health::Error);
        assert_eq!(status.sources[2].status, Health::Disabled);
        assert!(!status.is_healthy());

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["firewall"]["status"], "ok");
        assert_eq!(value["sources"][2]["status"], "disabled");
        assert!(value["firewall"].get("error").is_none());
    }

    #[tokio::test]
    async fn test_check_connectivity() {
        let store = Arc::new(MemoryStore::new(snapshot()));
        let allowlister = driver(&store, vec![failing("cloudflare"), provider("netdata", &["10.0.0.1"])]);
        assert!(allowlister.check_connectivity().await.is_ok());

        let allowlister = driver(&store, vec![failing("cloudflare")]);
        assert!(matches!(
            allowlister.check_connectivity().await,
            Err(AllowlistError::AllProvidersFailed(1))
        ));

        store.fail_gets.store(1, Ordering::SeqCst);
        let allowlister = driver(&store, vec![provider("netdata", &["10.0.0.1"])]);
        assert!(matches!(
            allowlister.check_connectivity().await,
            Err(AllowlistError::StoreFetchFailed { .. })
        ));
    }
}
