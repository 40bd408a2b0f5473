//! Signal handling for graceful shutdown.
//!
//! SIGINT and SIGTERM cancel a shared [`ShutdownToken`]; long-running loops
//! finish their current cycle and then stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::{info, warn};

/// A token that can be shared across tasks to request and observe shutdown.
#[derive(Clone, Debug, Default)]
pub struct ShutdownToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    flag: AtomicBool,
    notify: Notify,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if shutdown has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Request shutdown, waking every task waiting in [`cancelled`](Self::cancelled).
    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Resolves once shutdown has been requested.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel is not missed
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Spawn a task that cancels `token` on SIGINT or SIGTERM.
///
/// If signal handlers cannot be registered (e.g., in restricted environments),
/// a warning is logged and only explicit cancellation stops the process.
pub fn listen_for_signals(token: ShutdownToken) {
    tokio::spawn(async move {
        // Try to register signal handlers - may fail in containers or restricted envs
        let sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("Failed to register SIGINT handler: {}", e);
                None
            }
        };

        let sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                None
            }
        };

        match (sigint, sigterm) {
            (Some(mut int), Some(mut term)) => {
                tokio::select! {
                    _ = int.recv() => info!("Received SIGINT, initiating graceful shutdown..."),
                    _ = term.recv() => info!("Received SIGTERM, initiating graceful shutdown..."),
                }
            }
            (Some(mut int), None) => {
                int.recv().await;
                info!("Received SIGINT, initiating graceful shutdown...");
            }
            (None, Some(mut term)) => {
                term.recv().await;
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
            (None, None) => {
                warn!("No signal handlers registered - graceful shutdown disabled");
                return;
            }
        }

        token.cancel();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_shutdown_token() {
        let token = ShutdownToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_shutdown_token_clone() {
        let token1 = ShutdownToken::new();
        let token2 = token1.clone();

        token1.cancel();

        assert!(token1.is_cancelled());
        assert!(token2.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_cancel() {
        let token = ShutdownToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        tokio::task::yield_now().await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let token = ShutdownToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .unwrap();
    }
}
