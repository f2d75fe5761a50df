//! Database Per Tenant
//!
//! Request-path entry point: turn a tenant key into a live handle for that
//! tenant's store.
//!
//! # Usage
//!
//! ```rust,ignore
//! let manager = TenantDatabaseManager::new(registry, cache.clone());
//!
//! // In a request handler, after authentication
//! let conn = manager.get_connection(&TenantKey::id(claims.tenant_id)).await?;
//! let rows = conn.connection().query_all(statement).await?;
//! ```

use crate::cache::ConnectionCache;
use crate::error::{TenantError, TenantResult};
use crate::factory::ConnectionFactory;
use crate::handle::ConnectionHandle;
use crate::registry::TenantRegistry;
use crate::tenant::TenantKey;
use keystone_log::debug;
use std::sync::Arc;

/// Resolves tenants and hands out their cached connections.
pub struct TenantDatabaseManager<F: ConnectionFactory> {
    registry: TenantRegistry,
    cache: Arc<ConnectionCache<F>>,
}

impl<F: ConnectionFactory> TenantDatabaseManager<F> {
    /// Create a manager over a registry and a shared cache.
    pub fn new(registry: TenantRegistry, cache: Arc<ConnectionCache<F>>) -> Self {
        Self { registry, cache }
    }

    /// The registry used for lookups.
    pub fn registry(&self) -> &TenantRegistry {
        &self.registry
    }

    /// The shared connection cache.
    pub fn cache(&self) -> &Arc<ConnectionCache<F>> {
        &self.cache
    }

    /// Get the connection for a tenant.
    ///
    /// Fails with `NotFound` for unknown keys and `Inactive` for suspended or
    /// expired tenants; connection errors are returned as-is.
    pub async fn get_connection(
        &self,
        key: &TenantKey,
    ) -> TenantResult<Arc<ConnectionHandle<F::Client>>> {
        let record = self.registry.find(key).await?;
        if !record.status.allows_access() {
            debug!(fields: [tenant = key, status = record.status], "Access refused");
            return Err(TenantError::Inactive {
                tenant: record.id,
                status: record.status.to_string(),
            });
        }
        self.cache.get_or_create(&record.database_name).await
    }

    /// Get a connection by physical store name, skipping the registry.
    ///
    /// For callers that already derived the name from the slug.
    pub async fn connect_store(
        &self,
        store_name: &str,
    ) -> TenantResult<Arc<ConnectionHandle<F::Client>>> {
        self.cache.get_or_create(store_name).await
    }

    /// Drop the cached connection for a tenant so the next request reconnects.
    pub async fn invalidate_tenant(&self, key: &TenantKey) -> TenantResult<bool> {
        let store_name = self.registry.resolve(key).await?;
        Ok(self.cache.evict(&store_name).await)
    }
}

impl<F: ConnectionFactory> Clone for TenantDatabaseManager<F> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            cache: Arc::clone(&self.cache),
        }
    }
}
