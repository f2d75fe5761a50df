//! Tenant Provisioning
//!
//! Creates a tenant end to end: control-plane record, physical store, schema,
//! and seed rows. Any failure before the schema is in place is compensated so
//! that either a usable tenant exists or nothing does.
//!
//! # Stages
//!
//! 1. Validate the request and check the slug is free
//! 2. Register a `trial` record (the rollback anchor)
//! 3. `CREATE DATABASE` over the admin connection
//! 4. Apply the schema over a fresh, uncached connection
//! 5. Seed defaults (failure is logged, not rolled back)
//!
//! ```rust,ignore
//! let provisioner = Provisioner::new(store, cache, "postgres");
//!
//! let tenant = provisioner
//!     .create_tenant(CreateTenantRequest::new("acme", "Acme Inc", "a@x.com", "Ada"))
//!     .await?;
//! assert_eq!(tenant.database_name, "tenant_acme");
//! ```

use crate::cache::ConnectionCache;
use crate::error::{TenantError, TenantResult};
use crate::factory::{ConnectionFactory, StoreClient};
use crate::registry::TenantStore;
use crate::schema::{create_database_sql, drop_database_sql, SchemaScript, SeedData};
use crate::tenant::{normalize_slug, StoreNaming, TenantKey, TenantRecord};
use keystone_log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Seat limit for new tenants when none is given.
pub const DEFAULT_MAX_USERS: i32 = 10;

/// Input to [`Provisioner::create_tenant`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTenantRequest {
    /// Requested slug; normalized before use
    pub slug: String,
    /// Company display name
    pub company_name: String,
    /// Email of the first administrator
    pub admin_email: String,
    /// Name of the first administrator
    pub admin_name: String,
    /// Seat limit
    #[serde(default = "default_max_users")]
    pub max_users: i32,
}

fn default_max_users() -> i32 {
    DEFAULT_MAX_USERS
}

impl CreateTenantRequest {
    /// Create a request with the default seat limit.
    pub fn new(
        slug: impl Into<String>,
        company_name: impl Into<String>,
        admin_email: impl Into<String>,
        admin_name: impl Into<String>,
    ) -> Self {
        Self {
            slug: slug.into(),
            company_name: company_name.into(),
            admin_email: admin_email.into(),
            admin_name: admin_name.into(),
            max_users: DEFAULT_MAX_USERS,
        }
    }

    /// Override the seat limit.
    pub fn with_max_users(mut self, max_users: i32) -> Self {
        self.max_users = max_users;
        self
    }

    /// Seed rows for this request.
    pub fn seed(&self) -> SeedData {
        SeedData::new(&self.company_name, &self.admin_email, &self.admin_name)
    }

    fn validate(&self) -> TenantResult<()> {
        if self.company_name.trim().is_empty() {
            return Err(TenantError::Invalid("company name is required".to_string()));
        }
        if self.admin_name.trim().is_empty() {
            return Err(TenantError::Invalid("admin name is required".to_string()));
        }
        let email = self.admin_email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => {
                return Err(TenantError::Invalid(format!(
                    "invalid admin email '{}'",
                    self.admin_email
                )))
            }
        }
        if self.max_users < 1 {
            return Err(TenantError::Invalid("max_users must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Orchestrates new-tenant creation with compensation.
pub struct Provisioner<F: ConnectionFactory> {
    store: Arc<dyn TenantStore>,
    cache: Arc<ConnectionCache<F>>,
    admin_database: String,
    naming: StoreNaming,
    schema: SchemaScript,
}

impl<F: ConnectionFactory> Provisioner<F> {
    /// Create a provisioner.
    ///
    /// `admin_database` is the maintenance database used for
    /// `CREATE DATABASE`; its handle is taken from `cache`.
    pub fn new(
        store: Arc<dyn TenantStore>,
        cache: Arc<ConnectionCache<F>>,
        admin_database: impl Into<String>,
    ) -> Self {
        Self {
            store,
            cache,
            admin_database: admin_database.into(),
            naming: StoreNaming::default(),
            schema: SchemaScript::current(),
        }
    }

    /// Use a custom store naming scheme.
    pub fn with_naming(mut self, naming: StoreNaming) -> Self {
        self.naming = naming;
        self
    }

    /// Naming scheme for new stores.
    pub fn naming(&self) -> &StoreNaming {
        &self.naming
    }

    /// Create a tenant and its physical store.
    ///
    /// Returns the `trial` record. A used slug, or a slug whose store name
    /// is already registered, fails with `Conflict` before anything is
    /// created.
    ///
    /// The stages run on their own task: dropping the returned future does
    /// not interrupt provisioning or its rollback.
    pub async fn create_tenant(&self, request: CreateTenantRequest) -> TenantResult<TenantRecord> {
        let provisioner = self.clone();
        tokio::spawn(async move { provisioner.provision(request).await })
            .await
            .map_err(|e| TenantError::Provisioning(format!("provisioning task failed: {}", e)))?
    }

    async fn provision(&self, request: CreateTenantRequest) -> TenantResult<TenantRecord> {
        // 1. Validate
        let slug = normalize_slug(&request.slug)?;
        request.validate()?;
        if self.store.find(&TenantKey::slug(&slug)).await?.is_some() {
            return Err(TenantError::Conflict(slug));
        }
        let database_name = self.naming.store_name(&slug)?;
        if let Some(owner) = self.store.find_by_store(&database_name).await? {
            warn!(
                fields: [slug = slug, store = database_name, owner = owner.slug],
                "Store name already belongs to another tenant"
            );
            return Err(TenantError::Conflict(database_name));
        }

        // 2. Register
        let record = TenantRecord::new_trial(&slug, &database_name, request.max_users);
        self.store.insert(&record).await?;
        info!(
            fields: [tenant = record.id, slug = slug, store = database_name],
            "Tenant registered"
        );

        // 3. Create the physical store
        if let Err(e) = self.create_store(&database_name).await {
            error!(fields: [slug = slug], "Creating store failed: {}", e);
            self.discard_record(&record).await;
            return Err(e);
        }

        // 4. Apply schema over a fresh connection
        let handle = match self.cache.factory().build(&database_name).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(fields: [slug = slug], "Connecting to new store failed: {}", e);
                self.drop_store(&database_name).await;
                self.discard_record(&record).await;
                return Err(e);
            }
        };

        if let Err(e) = self.schema.apply(handle.client()).await {
            error!(fields: [slug = slug], "Schema application failed: {}", e);
            self.close_quietly(&handle).await;
            self.drop_store(&database_name).await;
            self.discard_record(&record).await;
            return Err(match e {
                TenantError::Provisioning(_) => e,
                other => TenantError::Provisioning(other.to_string()),
            });
        }

        // 5. Seed
        if let Err(e) = request.seed().apply(handle.client()).await {
            warn!(
                fields: [slug = slug],
                "Seeding failed, tenant left under-seeded: {}", e
            );
        }

        self.close_quietly(&handle).await;
        info!(fields: [tenant = record.id, slug = slug], "Tenant provisioned");
        Ok(record)
    }

    async fn create_store(&self, database_name: &str) -> TenantResult<()> {
        let admin = self.cache.get_or_create(&self.admin_database).await?;
        admin
            .execute_unprepared(&create_database_sql(database_name))
            .await?;
        info!(fields: [store = database_name], "Physical store created");
        Ok(())
    }

    async fn drop_store(&self, database_name: &str) {
        let result = match self.cache.get_or_create(&self.admin_database).await {
            Ok(admin) => admin.execute_unprepared(&drop_database_sql(database_name)).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => info!(fields: [store = database_name], "Rolled back physical store"),
            Err(e) => error!(
                fields: [store = database_name],
                "Dropping store during rollback failed: {}", e
            ),
        }
    }

    async fn discard_record(&self, record: &TenantRecord) {
        match self.store.delete(&record.id).await {
            Ok(_) => info!(fields: [tenant = record.id], "Rolled back tenant record"),
            Err(e) => error!(
                fields: [tenant = record.id],
                "Deleting tenant record during rollback failed: {}", e
            ),
        }
    }

    async fn close_quietly(&self, handle: &crate::handle::ConnectionHandle<F::Client>) {
        if let Err(e) = handle.close().await {
            warn!(fields: [store = handle.store_name()], "Closing provisioning connection: {}", e);
        }
    }
}

impl<F: ConnectionFactory> Clone for Provisioner<F> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            admin_database: self.admin_database.clone(),
            naming: self.naming.clone(),
            schema: self.schema,
        }
    }
}

impl<F: ConnectionFactory> std::fmt::Debug for Provisioner<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("admin_database", &self.admin_database)
            .field("naming", &self.naming)
            .field("schema_version", &self.schema.version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{InMemoryTenantStore, TenantRegistry};
    use crate::tenant::TenantStatus;
    use crate::testing::StubConnectionFactory;
    use std::time::Duration;

    struct Fixture {
        store: Arc<InMemoryTenantStore>,
        cache: Arc<ConnectionCache<StubConnectionFactory>>,
        provisioner: Provisioner<StubConnectionFactory>,
    }

    fn fixture(factory: StubConnectionFactory) -> Fixture {
        let store = Arc::new(InMemoryTenantStore::new());
        let cache = Arc::new(ConnectionCache::new(factory));
        let provisioner = Provisioner::new(store.clone(), cache.clone(), "postgres");
        Fixture {
            store,
            cache,
            provisioner,
        }
    }

    fn acme() -> CreateTenantRequest {
        CreateTenantRequest::new("acme", "Acme Inc", "a@x.com", "Ada Admin")
    }

    #[tokio::test]
    async fn test_create_tenant() {
        let fx = fixture(StubConnectionFactory::new());

        let record = fx.provisioner.create_tenant(acme()).await.unwrap();

        assert_eq!(record.database_name, "tenant_acme");
        assert_eq!(record.status, TenantStatus::Trial);
        assert_eq!(record.max_users, DEFAULT_MAX_USERS);

        let admin = fx.cache.factory().client("postgres").unwrap();
        assert!(admin.ran("CREATE DATABASE \"tenant_acme\""));

        let tenant = fx.cache.factory().client("tenant_acme").unwrap();
        assert!(tenant.ran("CREATE TABLE IF NOT EXISTS employees"));
        assert!(tenant.ran("INSERT INTO users"));
        assert_eq!(tenant.close_calls(), 1);

        // Provisioning connection bypasses the cache
        assert!(!fx.cache.contains("tenant_acme"));
    }

    #[tokio::test]
    async fn test_second_create_conflicts() {
        let fx = fixture(StubConnectionFactory::new());
        fx.provisioner.create_tenant(acme()).await.unwrap();

        let err = fx.provisioner.create_tenant(acme()).await.unwrap_err();

        assert_eq!(err, TenantError::Conflict("acme".to_string()));
        assert_eq!(fx.store.count_slug("acme"), 1);
        assert_eq!(fx.cache.factory().builds_for("tenant_acme"), 1);
    }

    #[tokio::test]
    async fn test_colliding_store_name_conflicts() {
        let fx = fixture(StubConnectionFactory::new());
        let first = CreateTenantRequest::new("acme-corp", "Acme", "a@x.com", "Ada");
        fx.provisioner.create_tenant(first).await.unwrap();

        let second = CreateTenantRequest::new("acme_corp", "Acme Two", "b@x.com", "Bo");
        let err = fx.provisioner.create_tenant(second).await.unwrap_err();

        assert_eq!(err, TenantError::Conflict("tenant_acme_corp".to_string()));
        assert_eq!(fx.store.len(), 1);
        assert_eq!(fx.cache.factory().builds_for("tenant_acme_corp"), 1);
        let admin = fx.cache.factory().client("postgres").unwrap();
        assert!(!admin.ran("DROP DATABASE"));
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_strand_tenant() {
        let fx = fixture(StubConnectionFactory::new().with_delay(Duration::from_millis(100)));

        // Gives up while the new store's connection is still being built
        let outcome = tokio::time::timeout(
            Duration::from_millis(150),
            fx.provisioner.create_tenant(acme()),
        )
        .await;
        assert!(outcome.is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;

        let record = fx
            .store
            .find(&TenantKey::slug("acme"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.database_name, "tenant_acme");
        let tenant = fx.cache.factory().client("tenant_acme").unwrap();
        assert!(tenant.ran("CREATE TABLE IF NOT EXISTS payslips"));
        assert!(tenant.ran("INSERT INTO users"));
        assert_eq!(tenant.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_schema_failure_rolls_back_everything() {
        let fx = fixture(
            StubConnectionFactory::new().fail_sql_containing("CREATE TABLE IF NOT EXISTS payslips"),
        );

        let err = fx.provisioner.create_tenant(acme()).await.unwrap_err();
        assert!(matches!(err, TenantError::Provisioning(_)));

        let registry = TenantRegistry::new(fx.store.clone());
        assert!(matches!(
            registry.resolve(&TenantKey::slug("acme")).await,
            Err(TenantError::NotFound(_))
        ));
        assert!(fx.store.is_empty());

        let admin = fx.cache.factory().client("postgres").unwrap();
        assert!(admin.ran("DROP DATABASE IF EXISTS \"tenant_acme\""));
        let tenant = fx.cache.factory().client("tenant_acme").unwrap();
        assert_eq!(tenant.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_create_database_failure_removes_record() {
        let fx = fixture(StubConnectionFactory::new().fail_sql_containing("CREATE DATABASE"));

        assert!(fx.provisioner.create_tenant(acme()).await.is_err());

        assert!(fx.store.is_empty());
        assert_eq!(fx.cache.factory().builds_for("tenant_acme"), 0);
    }

    #[tokio::test]
    async fn test_unreachable_new_store_rolls_back() {
        let fx = fixture(StubConnectionFactory::new().unreachable("tenant_acme"));

        let err = fx.provisioner.create_tenant(acme()).await.unwrap_err();

        assert!(matches!(err, TenantError::Connection(_)));
        assert!(fx.store.is_empty());
        let admin = fx.cache.factory().client("postgres").unwrap();
        assert!(admin.ran("DROP DATABASE"));
    }

    #[tokio::test]
    async fn test_seed_failure_keeps_tenant() {
        let fx = fixture(StubConnectionFactory::new().fail_sql_containing("INSERT INTO leave_types"));

        let record = fx.provisioner.create_tenant(acme()).await.unwrap();

        assert_eq!(fx.store.count_slug("acme"), 1);
        assert_eq!(record.status, TenantStatus::Trial);
        let admin = fx.cache.factory().client("postgres").unwrap();
        assert!(!admin.ran("DROP DATABASE"));
    }

    #[tokio::test]
    async fn test_slug_is_normalized() {
        let fx = fixture(StubConnectionFactory::new());
        let request = CreateTenantRequest::new(" Acme-Corp ", "Acme", "a@x.com", "Ada");

        let record = fx.provisioner.create_tenant(request).await.unwrap();

        assert_eq!(record.slug, "acme-corp");
        assert_eq!(record.database_name, "tenant_acme_corp");
    }

    #[tokio::test]
    async fn test_invalid_requests_create_nothing() {
        let fx = fixture(StubConnectionFactory::new());

        let bad_slug = CreateTenantRequest::new("bad slug", "Acme", "a@x.com", "Ada");
        assert!(matches!(
            fx.provisioner.create_tenant(bad_slug).await,
            Err(TenantError::InvalidSlug { .. })
        ));

        let bad_email = CreateTenantRequest::new("acme", "Acme", "nobody", "Ada");
        assert!(matches!(
            fx.provisioner.create_tenant(bad_email).await,
            Err(TenantError::Invalid(_))
        ));

        let no_seats = acme().with_max_users(0);
        assert!(fx.provisioner.create_tenant(no_seats).await.is_err());

        assert!(fx.store.is_empty());
        assert_eq!(fx.cache.factory().builds(), 0);
    }
}
