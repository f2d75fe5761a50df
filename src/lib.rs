// Keystone - database-per-tenant connection and provisioning for SaaS backends
//
// This library wires the tenancy core together: one connection cache, one
// control-plane store, and the services request handlers and admin endpoints
// call into.

// Re-export the tenancy core
pub use keystone_tenancy::*;

// Re-export supporting crates
pub use keystone_config;
pub use keystone_log;

use keystone_config::EnvLoader;
use keystone_log::{info, warn};
use std::sync::Arc;

/// Composition root for the tenancy core.
///
/// Built once at startup and shared by reference; owns the only connection
/// cache in the process.
pub struct Keystone<F: ConnectionFactory = SeaOrmConnectionFactory> {
    config: TenancyConfig,
    cache: Arc<ConnectionCache<F>>,
    store: Arc<dyn TenantStore>,
    databases: TenantDatabaseManager<F>,
    provisioner: Provisioner<F>,
    administration: TenantAdministration<F>,
    lifecycle: LifecycleManager<F>,
}

impl Keystone<SeaOrmConnectionFactory> {
    /// Load `.env` and the environment, then [`connect`](Self::connect).
    pub async fn from_env() -> TenantResult<Self> {
        EnvLoader::load_dotenv(None)?;
        if keystone_log::install_log_bridge().is_err() {
            warn!("A global logger is already installed; SeaORM logs go there");
        }
        Self::connect(TenancyConfig::from_env()?).await
    }

    /// Connect to the control plane and assemble every service.
    ///
    /// Failing to reach the control-plane database is the only fatal error.
    pub async fn connect(config: TenancyConfig) -> TenantResult<Self> {
        let factory = SeaOrmConnectionFactory::new(&config.credentials, config.pool.clone())?;
        let cache = Arc::new(ConnectionCache::new(factory));

        let control = cache.get_or_create(&config.control_plane_database).await?;
        let store = SeaOrmTenantStore::new(control.client().shared());
        store.ensure_table().await?;

        info!(
            fields: [control_plane = config.control_plane_database],
            "Control plane connected"
        );
        Ok(Self::new(config, cache, Arc::new(store)))
    }
}

impl<F: ConnectionFactory> Keystone<F> {
    /// Assemble services over an existing cache and tenant store.
    pub fn new(
        config: TenancyConfig,
        cache: Arc<ConnectionCache<F>>,
        store: Arc<dyn TenantStore>,
    ) -> Self {
        let databases =
            TenantDatabaseManager::new(TenantRegistry::new(store.clone()), cache.clone());
        let provisioner = Provisioner::new(store.clone(), cache.clone(), &config.admin_database)
            .with_naming(config.naming.clone());
        let administration =
            TenantAdministration::new(store.clone(), cache.clone(), &config.admin_database);
        let lifecycle = LifecycleManager::new(cache.clone());

        Self {
            config,
            cache,
            store,
            databases,
            provisioner,
            administration,
            lifecycle,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &TenancyConfig {
        &self.config
    }

    /// The process-wide connection cache.
    pub fn cache(&self) -> &Arc<ConnectionCache<F>> {
        &self.cache
    }

    /// The control-plane tenant store.
    pub fn store(&self) -> &Arc<dyn TenantStore> {
        &self.store
    }

    /// Request-path connection lookup.
    pub fn databases(&self) -> &TenantDatabaseManager<F> {
        &self.databases
    }

    /// Tenant creation.
    pub fn provisioner(&self) -> &Provisioner<F> {
        &self.provisioner
    }

    /// Status changes, deletion, seed repair.
    pub fn administration(&self) -> &TenantAdministration<F> {
        &self.administration
    }

    /// Shutdown coordination.
    pub fn lifecycle(&self) -> &LifecycleManager<F> {
        &self.lifecycle
    }

    /// Shorthand for [`TenantDatabaseManager::get_connection`].
    pub async fn get_connection(
        &self,
        key: &TenantKey,
    ) -> TenantResult<Arc<ConnectionHandle<F::Client>>> {
        self.databases.get_connection(key).await
    }

    /// Shorthand for [`Provisioner::create_tenant`].
    pub async fn create_tenant(&self, request: CreateTenantRequest) -> TenantResult<TenantRecord> {
        self.provisioner.create_tenant(request).await
    }

    /// Shorthand for [`LifecycleManager::shutdown`].
    pub async fn shutdown(&self) -> DrainReport {
        self.lifecycle.shutdown().await
    }
}

// Prelude for common imports
pub mod prelude {
    pub use crate::Keystone;
    pub use keystone_tenancy::prelude::*;
}
