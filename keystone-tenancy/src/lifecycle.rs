//! Process shutdown for tenant connections.
//!
//! ```rust,ignore
//! let lifecycle = Arc::new(LifecycleManager::new(cache.clone()));
//!
//! tokio::spawn({
//!     let lifecycle = lifecycle.clone();
//!     async move { lifecycle.shutdown_on_signal().await }
//! });
//! ```

use crate::cache::{ConnectionCache, DrainReport};
use crate::factory::ConnectionFactory;
use keystone_log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Drains the connection cache once at process termination.
pub struct LifecycleManager<F: ConnectionFactory> {
    cache: Arc<ConnectionCache<F>>,
    shut_down: AtomicBool,
}

impl<F: ConnectionFactory> LifecycleManager<F> {
    /// Manage `cache`.
    pub fn new(cache: Arc<ConnectionCache<F>>) -> Self {
        Self {
            cache,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has started.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Close every cached handle.
    ///
    /// Returns once each handle has been asked to close. Only the first call
    /// drains; later calls return an empty report.
    pub async fn shutdown(&self) -> DrainReport {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            debug!("Shutdown already performed");
            return DrainReport::default();
        }

        info!("Shutting down tenant connections");
        let report = self.cache.drain_all().await;
        if !report.is_clean() {
            warn!(
                fields: [failed = report.failed.len()],
                "Some tenant connections failed to close"
            );
        }
        report
    }

    /// Wait for Ctrl-C, then [`shutdown`](Self::shutdown).
    pub async fn shutdown_on_signal(&self) -> DrainReport {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Listening for shutdown signal failed: {}", e);
        }
        self.shutdown().await
    }
}

impl<F: ConnectionFactory> std::fmt::Debug for LifecycleManager<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubConnectionFactory;

    #[tokio::test]
    async fn test_shutdown_drains_once() {
        let cache = Arc::new(ConnectionCache::new(StubConnectionFactory::new()));
        let a = cache.get_or_create("tenant_a").await.unwrap();
        cache.get_or_create("tenant_b").await.unwrap();
        let lifecycle = LifecycleManager::new(cache.clone());

        let first = lifecycle.shutdown().await;
        let second = lifecycle.shutdown().await;

        assert_eq!(first.total(), 2);
        assert_eq!(second, DrainReport::default());
        assert!(a.is_closed());
        assert!(cache.is_empty());
        assert!(lifecycle.is_shut_down());
    }

    #[tokio::test]
    async fn test_shutdown_tolerates_close_failures() {
        let cache = Arc::new(ConnectionCache::new(
            StubConnectionFactory::new().fail_close_for("tenant_a"),
        ));
        cache.get_or_create("tenant_a").await.unwrap();
        cache.get_or_create("tenant_b").await.unwrap();

        let report = LifecycleManager::new(cache.clone()).shutdown().await;

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.closed, vec!["tenant_b".to_string()]);
        assert!(cache.is_empty());
    }
}
