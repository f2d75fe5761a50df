//! Tenant Administration
//!
//! Status changes, permanent deletion, and seed repair for existing tenants.
//! Status changes are single-row updates on the control-plane store.

use crate::cache::ConnectionCache;
use crate::error::{TenantError, TenantResult};
use crate::factory::{ConnectionFactory, StoreClient};
use crate::registry::TenantStore;
use crate::schema::{drop_database_sql, SeedData};
use crate::tenant::{TenantKey, TenantRecord, TenantStatus};
use keystone_log::{info, warn};
use std::sync::Arc;

/// Administrative operations on existing tenants.
pub struct TenantAdministration<F: ConnectionFactory> {
    store: Arc<dyn TenantStore>,
    cache: Arc<ConnectionCache<F>>,
    admin_database: String,
}

impl<F: ConnectionFactory> TenantAdministration<F> {
    /// Create the administration service.
    pub fn new(
        store: Arc<dyn TenantStore>,
        cache: Arc<ConnectionCache<F>>,
        admin_database: impl Into<String>,
    ) -> Self {
        Self {
            store,
            cache,
            admin_database: admin_database.into(),
        }
    }

    async fn find(&self, id: &str) -> TenantResult<TenantRecord> {
        self.store
            .find(&TenantKey::id(id))
            .await?
            .ok_or_else(|| TenantError::NotFound(id.to_string()))
    }

    async fn set_status(&self, id: &str, status: TenantStatus) -> TenantResult<TenantRecord> {
        let record = self.store.update_status(id, status).await?;
        info!(fields: [tenant = id, status = status], "Tenant status changed");
        Ok(record)
    }

    /// Block access. The cached handle is evicted so open pools are released.
    pub async fn suspend(&self, id: &str) -> TenantResult<TenantRecord> {
        let record = self.set_status(id, TenantStatus::Suspended).await?;
        self.cache.evict(&record.database_name).await;
        Ok(record)
    }

    /// Mark the subscription lapsed. Evicts like [`suspend`](Self::suspend).
    pub async fn expire(&self, id: &str) -> TenantResult<TenantRecord> {
        let record = self.set_status(id, TenantStatus::Expired).await?;
        self.cache.evict(&record.database_name).await;
        Ok(record)
    }

    /// Restore a suspended or expired tenant to `active`.
    pub async fn reactivate(&self, id: &str) -> TenantResult<TenantRecord> {
        let record = self.find(id).await?;
        if record.status.allows_access() {
            return Err(TenantError::Invalid(format!(
                "tenant {} is {}, not suspended or expired",
                id, record.status
            )));
        }
        self.set_status(id, TenantStatus::Active).await
    }

    /// Convert a trial into a paying tenant.
    pub async fn activate(&self, id: &str) -> TenantResult<TenantRecord> {
        let record = self.find(id).await?;
        if record.status != TenantStatus::Trial {
            return Err(TenantError::Invalid(format!(
                "tenant {} is {}, not trial",
                id, record.status
            )));
        }
        self.set_status(id, TenantStatus::Active).await
    }

    /// Destroy the tenant: evict its handle, drop its store, delete its record.
    ///
    /// The record is only deleted once the store is gone, so a failed drop
    /// can be retried.
    pub async fn delete_permanently(&self, id: &str) -> TenantResult<TenantRecord> {
        let record = self.find(id).await?;

        self.cache.evict(&record.database_name).await;

        let admin = self.cache.get_or_create(&self.admin_database).await?;
        admin
            .execute_unprepared(&drop_database_sql(&record.database_name))
            .await?;
        info!(fields: [store = record.database_name], "Physical store dropped");

        self.store.delete(&record.id).await?;
        info!(fields: [tenant = record.id, slug = record.slug], "Tenant deleted permanently");
        Ok(record)
    }

    /// Re-apply the default seed to an under-seeded tenant.
    ///
    /// Existing rows are left untouched.
    pub async fn repair_seed(&self, id: &str, seed: &SeedData) -> TenantResult<()> {
        let record = self.find(id).await?;
        let handle = self.cache.get_or_create(&record.database_name).await?;
        match seed.apply(handle.client()).await {
            Ok(()) => {
                info!(fields: [tenant = id], "Seed data repaired");
                Ok(())
            }
            Err(e) => {
                warn!(fields: [tenant = id], "Seed repair failed: {}", e);
                Err(TenantError::Provisioning(e.to_string()))
            }
        }
    }
}

impl<F: ConnectionFactory> std::fmt::Debug for TenantAdministration<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantAdministration")
            .field("admin_database", &self.admin_database)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryTenantStore;
    use crate::testing::StubConnectionFactory;

    async fn fixture(
        factory: StubConnectionFactory,
    ) -> (
        Arc<InMemoryTenantStore>,
        Arc<ConnectionCache<StubConnectionFactory>>,
        TenantAdministration<StubConnectionFactory>,
        TenantRecord,
    ) {
        let store = Arc::new(InMemoryTenantStore::new());
        let record = TenantRecord::new_trial("acme", "tenant_acme", 10);
        store.insert(&record).await.unwrap();
        let cache = Arc::new(ConnectionCache::new(factory));
        let admin = TenantAdministration::new(store.clone(), cache.clone(), "postgres");
        (store, cache, admin, record)
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let (_, _, admin, record) = fixture(StubConnectionFactory::new()).await;

        assert!(admin.reactivate(&record.id).await.is_err());
        assert_eq!(
            admin.activate(&record.id).await.unwrap().status,
            TenantStatus::Active
        );
        assert!(admin.activate(&record.id).await.is_err());
        assert_eq!(
            admin.suspend(&record.id).await.unwrap().status,
            TenantStatus::Suspended
        );
        assert_eq!(
            admin.reactivate(&record.id).await.unwrap().status,
            TenantStatus::Active
        );
        assert_eq!(
            admin.expire(&record.id).await.unwrap().status,
            TenantStatus::Expired
        );
    }

    #[tokio::test]
    async fn test_suspend_evicts_cached_handle() {
        let (_, cache, admin, record) = fixture(StubConnectionFactory::new()).await;
        let handle = cache.get_or_create("tenant_acme").await.unwrap();

        admin.suspend(&record.id).await.unwrap();

        assert!(handle.is_closed());
        assert!(!cache.contains("tenant_acme"));
    }

    #[tokio::test]
    async fn test_unknown_tenant() {
        let (_, _, admin, _) = fixture(StubConnectionFactory::new()).await;
        assert!(matches!(
            admin.suspend("missing").await,
            Err(TenantError::NotFound(_))
        ));
        assert!(matches!(
            admin.delete_permanently("missing").await,
            Err(TenantError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_permanently() {
        let (store, cache, admin, record) = fixture(StubConnectionFactory::new()).await;
        let handle = cache.get_or_create("tenant_acme").await.unwrap();

        admin.delete_permanently(&record.id).await.unwrap();

        assert!(handle.is_closed());
        assert!(store.is_empty());
        let postgres = cache.factory().client("postgres").unwrap();
        assert!(postgres.ran("DROP DATABASE IF EXISTS \"tenant_acme\""));
    }

    #[tokio::test]
    async fn test_failed_drop_keeps_record() {
        let (store, _, admin, record) =
            fixture(StubConnectionFactory::new().fail_sql_containing("DROP DATABASE")).await;

        assert!(admin.delete_permanently(&record.id).await.is_err());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_repair_seed() {
        let (_, cache, admin, record) = fixture(StubConnectionFactory::new()).await;

        admin
            .repair_seed(&record.id, &SeedData::new("Acme", "a@x.com", "Ada"))
            .await
            .unwrap();

        let tenant = cache.factory().client("tenant_acme").unwrap();
        assert!(tenant.ran("INSERT INTO leave_types"));
        assert!(cache.contains("tenant_acme"));
    }
}
