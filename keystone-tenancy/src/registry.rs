//! Tenant Registry
//!
//! Read-side lookup from a tenant key to its physical store, backed by the
//! control-plane `tenants` table through the [`TenantStore`] trait.

use crate::error::{TenantError, TenantResult};
use crate::tenant::{TenantKey, TenantRecord, TenantStatus};
use async_trait::async_trait;
use keystone_log::debug;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Control-plane storage for tenant records.
///
/// Every mutation is a single-row operation.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Point lookup by id or slug.
    async fn find(&self, key: &TenantKey) -> TenantResult<Option<TenantRecord>>;

    /// Lookup by physical store name.
    async fn find_by_store(&self, database_name: &str) -> TenantResult<Option<TenantRecord>>;

    /// Insert a new record. Fails with `Conflict` if the slug or the store
    /// name is taken.
    async fn insert(&self, record: &TenantRecord) -> TenantResult<()>;

    /// Delete by id. Returns whether a row was removed.
    async fn delete(&self, id: &str) -> TenantResult<bool>;

    /// Set the subscription status of one tenant and return the updated row.
    async fn update_status(&self, id: &str, status: TenantStatus) -> TenantResult<TenantRecord>;

    /// Every record with the given status, in no particular order.
    async fn list_by_status(&self, status: TenantStatus) -> TenantResult<Vec<TenantRecord>>;
}

/// In-memory tenant store for tests and local development.
#[derive(Default)]
pub struct InMemoryTenantStore {
    tenants: RwLock<HashMap<String, TenantRecord>>,
}

impl InMemoryTenantStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.tenants.read().len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.tenants.read().is_empty()
    }

    /// Number of records with the given slug.
    pub fn count_slug(&self, slug: &str) -> usize {
        self.tenants
            .read()
            .values()
            .filter(|t| t.slug == slug)
            .count()
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn find(&self, key: &TenantKey) -> TenantResult<Option<TenantRecord>> {
        let tenants = self.tenants.read();
        Ok(match key {
            TenantKey::Id(id) => tenants.get(id).cloned(),
            TenantKey::Slug(_) => tenants.values().find(|t| t.matches(key)).cloned(),
        })
    }

    async fn find_by_store(&self, database_name: &str) -> TenantResult<Option<TenantRecord>> {
        Ok(self
            .tenants
            .read()
            .values()
            .find(|t| t.database_name == database_name)
            .cloned())
    }

    async fn insert(&self, record: &TenantRecord) -> TenantResult<()> {
        let mut tenants = self.tenants.write();
        if tenants.values().any(|t| t.slug == record.slug) {
            return Err(TenantError::Conflict(record.slug.clone()));
        }
        if tenants.values().any(|t| t.database_name == record.database_name) {
            return Err(TenantError::Conflict(format!("store {}", record.database_name)));
        }
        if tenants.contains_key(&record.id) {
            return Err(TenantError::Conflict(format!("id {}", record.id)));
        }
        tenants.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> TenantResult<bool> {
        Ok(self.tenants.write().remove(id).is_some())
    }

    async fn update_status(&self, id: &str, status: TenantStatus) -> TenantResult<TenantRecord> {
        let mut tenants = self.tenants.write();
        let record = tenants
            .get_mut(id)
            .ok_or_else(|| TenantError::NotFound(id.to_string()))?;
        record.status = status;
        Ok(record.clone())
    }

    async fn list_by_status(&self, status: TenantStatus) -> TenantResult<Vec<TenantRecord>> {
        Ok(self
            .tenants
            .read()
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect())
    }
}

/// Resolves tenant keys to physical store names.
#[derive(Clone)]
pub struct TenantRegistry {
    store: Arc<dyn TenantStore>,
}

impl TenantRegistry {
    /// Create a registry over a control-plane store.
    pub fn new(store: Arc<dyn TenantStore>) -> Self {
        Self { store }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn TenantStore> {
        &self.store
    }

    /// Full record for `key`, or `NotFound`.
    pub async fn find(&self, key: &TenantKey) -> TenantResult<TenantRecord> {
        self.store
            .find(key)
            .await?
            .ok_or_else(|| TenantError::NotFound(key.to_string()))
    }

    /// Physical store name for `key`, or `NotFound`.
    pub async fn resolve(&self, key: &TenantKey) -> TenantResult<String> {
        let record = self.find(key).await?;
        debug!(fields: [tenant = key, store = record.database_name], "Resolved tenant");
        Ok(record.database_name)
    }

    /// Every tenant whose status is `active`. Order is unspecified.
    pub async fn list_active(&self) -> TenantResult<Vec<TenantRecord>> {
        self.store.list_by_status(TenantStatus::Active).await
    }
}

impl std::fmt::Debug for TenantRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (Arc<InMemoryTenantStore>, TenantRegistry, TenantRecord) {
        let store = Arc::new(InMemoryTenantStore::new());
        let record = TenantRecord::new_trial("acme", "tenant_acme", 10);
        store.insert(&record).await.unwrap();
        let registry = TenantRegistry::new(store.clone());
        (store, registry, record)
    }

    #[tokio::test]
    async fn test_resolve_by_id_and_slug() {
        let (_, registry, record) = seeded().await;

        assert_eq!(
            registry.resolve(&TenantKey::id(&record.id)).await.unwrap(),
            "tenant_acme"
        );
        assert_eq!(
            registry.resolve(&TenantKey::slug("acme")).await.unwrap(),
            "tenant_acme"
        );
    }

    #[tokio::test]
    async fn test_resolve_unknown_is_not_found() {
        let (_, registry, _) = seeded().await;
        assert!(matches!(
            registry.resolve(&TenantKey::id("missing")).await,
            Err(TenantError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_slug_conflicts() {
        let (store, _, _) = seeded().await;
        let again = TenantRecord::new_trial("acme", "tenant_acme", 10);

        assert_eq!(
            store.insert(&again).await.unwrap_err(),
            TenantError::Conflict("acme".to_string())
        );
        assert_eq!(store.count_slug("acme"), 1);
    }

    #[tokio::test]
    async fn test_duplicate_store_name_conflicts() {
        let (store, _, _) = seeded().await;
        let sibling = TenantRecord::new_trial("acme-x", "tenant_acme", 10);

        assert!(matches!(
            store.insert(&sibling).await,
            Err(TenantError::Conflict(_))
        ));
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.find_by_store("tenant_acme").await.unwrap().map(|t| t.slug),
            Some("acme".to_string())
        );
    }

    #[tokio::test]
    async fn test_list_active_filters_status() {
        let (store, registry, trial) = seeded().await;
        let paying = TenantRecord::new_trial("globex", "tenant_globex", 10);
        store.insert(&paying).await.unwrap();
        store
            .update_status(&paying.id, TenantStatus::Active)
            .await
            .unwrap();

        let active = registry.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].slug, "globex");
        assert!(active.iter().all(|t| t.id != trial.id));
    }

    #[tokio::test]
    async fn test_update_status_unknown_tenant() {
        let store = InMemoryTenantStore::new();
        assert!(matches!(
            store.update_status("nope", TenantStatus::Suspended).await,
            Err(TenantError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, registry, record) = seeded().await;
        assert!(store.delete(&record.id).await.unwrap());
        assert!(!store.delete(&record.id).await.unwrap());
        assert!(registry.find(&TenantKey::slug("acme")).await.is_err());
    }
}
