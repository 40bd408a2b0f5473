//! Remote firewall stores.

mod digitalocean;

use async_trait::async_trait;

pub use digitalocean::{DigitalOceanStore, DEFAULT_BASE_URL};

use crate::error::Result;
use crate::rules::{FirewallSnapshot, InboundRule, Passthrough};

/// A remote firewall that is read whole and written whole.
#[async_trait]
pub trait FirewallStore: Send + Sync {
    /// Read the current state of the firewall
    async fn get_snapshot(&self, firewall_id: &str) -> Result<FirewallSnapshot>;

    /// Replace the firewall's inbound rules, handing back everything else unchanged
    async fn submit(
        &self,
        firewall_id: &str,
        name: &str,
        inbound_rules: &[InboundRule],
        passthrough: &Passthrough,
    ) -> Result<()>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::error::AllowlistError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// In-memory store for testing
    pub struct MemoryStore {
        pub snapshot: Mutex<FirewallSnapshot>,
        pub submissions: Mutex<Vec<Vec<InboundRule>>>,
        pub submitted_passthrough: Mutex<Vec<Passthrough>>,
        pub gets: AtomicU32,
        /// Number of upcoming reads that fail
        pub fail_gets: AtomicU32,
        /// Number of upcoming writes that fail
        pub fail_submits: AtomicU32,
    }

    impl MemoryStore {
        pub fn new(snapshot: FirewallSnapshot) -> Self {
            Self {
                snapshot: Mutex::new(snapshot),
                submissions: Mutex::new(Vec::new()),
                submitted_passthrough: Mutex::new(Vec::new()),
                gets: AtomicU32::new(0),
                fail_gets: AtomicU32::new(0),
                fail_submits: AtomicU32::new(0),
            }
        }

        pub fn submission_count(&self) -> usize {
            self.submissions.lock().unwrap().len()
        }

        pub fn last_submission(&self) -> Option<Vec<InboundRule>> {
            self.submissions.lock().unwrap().last().cloned()
        }

        fn take_failure(counter: &AtomicU32) -> bool {
            counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    #[async_trait]
    impl FirewallStore for MemoryStore {
        async fn get_snapshot(&self, firewall_id: &str) -> Result<FirewallSnapshot> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            if Self::take_failure(&self.fail_gets) {
                return Err(AllowlistError::StoreFetchFailed {
                    firewall_id: firewall_id.to_string(),
                    message: "HTTP 503".to_string(),
                });
            }
            Ok(self.snapshot.lock().unwrap().clone())
        }

        async fn submit(
            &self,
            firewall_id: &str,
            name: &str,
            inbound_rules: &[InboundRule],
            passthrough: &Passthrough,
        ) -> Result<()> {
            if Self::take_failure(&self.fail_submits) {
                return Err(AllowlistError::StoreSubmitFailed {
                    firewall_id: firewall_id.to_string(),
                    message: "HTTP 503".to_string(),
                });
            }
            let mut snapshot = self.snapshot.lock().unwrap();
            snapshot.name = name.to_string();
            snapshot.inbound_rules = inbound_rules.to_vec();
            snapshot.passthrough = passthrough.clone();
            self.submissions.lock().unwrap().push(inbound_rules.to_vec());
            self.submitted_passthrough.lock().unwrap().push(passthrough.clone());
            Ok(())
        }
    }
}
