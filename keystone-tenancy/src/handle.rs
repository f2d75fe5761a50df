//! Connection Handles
//!
//! A live pooled client for one physical store, plus the bookkeeping the
//! cache relies on: the initialized flag and an idempotent close.

use crate::config::{PoolConfig, TlsMode};
use crate::error::TenantResult;
use crate::factory::StoreClient;
use std::sync::atomic::{AtomicBool, Ordering};

/// Pooled client for one physical store.
///
/// Owned by the [`ConnectionCache`](crate::ConnectionCache) once cached;
/// callers receive an `Arc` clone for the duration of a request.
pub struct ConnectionHandle<C> {
    store_name: String,
    client: C,
    pool: PoolConfig,
    tls: TlsMode,
    initialized: AtomicBool,
    closed: AtomicBool,
}

impl<C: StoreClient> ConnectionHandle<C> {
    /// Wrap a freshly opened client. The handle starts uninitialized.
    pub fn new(store_name: impl Into<String>, client: C, pool: PoolConfig, tls: TlsMode) -> Self {
        Self {
            store_name: store_name.into(),
            client,
            pool,
            tls,
            initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Mark the handle usable. Factories call this once the pool answered.
    pub fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    /// Builder form of [`mark_initialized`](Self::mark_initialized).
    pub fn initialized(self) -> Self {
        self.mark_initialized();
        self
    }

    /// Whether the handle finished initialization and has not been closed.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire) && !self.is_closed()
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Physical store this handle points at.
    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    /// Pool limits the handle was built with.
    pub fn pool_config(&self) -> &PoolConfig {
        &self.pool
    }

    /// Effective TLS mode.
    pub fn tls(&self) -> TlsMode {
        self.tls
    }

    /// Borrow the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Close the underlying pool.
    ///
    /// Only the first call reaches the client; later calls return `Ok(())`.
    pub async fn close(&self) -> TenantResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.client.close().await
    }
}

impl<C> std::ops::Deref for ConnectionHandle<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

impl<C> std::fmt::Debug for ConnectionHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("store_name", &self.store_name)
            .field("tls", &self.tls)
            .field("max_connections", &self.pool.max_connections)
            .field("initialized", &self.initialized.load(Ordering::Relaxed))
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubClient;

    #[tokio::test]
    async fn test_starts_uninitialized() {
        let handle = ConnectionHandle::new(
            "tenant_acme",
            StubClient::new("tenant_acme"),
            PoolConfig::default(),
            TlsMode::Disabled,
        );
        assert!(!handle.is_initialized());
        handle.mark_initialized();
        assert!(handle.is_initialized());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let client = StubClient::new("tenant_acme");
        let handle = ConnectionHandle::new(
            "tenant_acme",
            client.clone(),
            PoolConfig::default(),
            TlsMode::Disabled,
        )
        .initialized();

        handle.close().await.unwrap();
        handle.close().await.unwrap();

        assert!(handle.is_closed());
        assert!(!handle.is_initialized());
        assert_eq!(client.close_calls(), 1);
    }
}
