//! Database-per-Tenant for Keystone
//!
//! Maps a tenant to its own PostgreSQL database, keeps one pooled connection
//! per database, provisions new tenants, and closes everything on shutdown.
//!
//! # Features
//!
//! - 🗄️ **Database Per Tenant** - Deterministic `tenant_<slug>` store names
//! - 🔁 **Single-Flight Cache** - Concurrent first access opens one pool
//! - 🏗️ **Provisioning** - Record, database, schema, and seed with rollback
//! - 📝 **Administration** - Suspend, reactivate, expire, delete, repair
//! - 🛑 **Graceful Shutdown** - Drain every pool exactly once
//!
//! # Quick Start
//!
//! ## 1. Configure and connect
//!
//! ```rust,ignore
//! use keystone_tenancy::*;
//!
//! let config = TenancyConfig::from_env()?;
//! let factory = SeaOrmConnectionFactory::new(&config.credentials, config.pool.clone())?;
//! let cache = Arc::new(ConnectionCache::new(factory));
//! ```
//!
//! ## 2. Control-plane store
//!
//! ```rust,ignore
//! let control = cache.get_or_create(&config.control_plane_database).await?;
//! let store = SeaOrmTenantStore::new(control.client().shared());
//! store.ensure_table().await?;
//! let store: Arc<dyn TenantStore> = Arc::new(store);
//! ```
//!
//! ## 3. Provision a tenant
//!
//! ```rust,ignore
//! let provisioner = Provisioner::new(store.clone(), cache.clone(), &config.admin_database);
//! let tenant = provisioner
//!     .create_tenant(CreateTenantRequest::new("acme", "Acme Inc", "a@x.com", "Ada"))
//!     .await?;
//! ```
//!
//! ## 4. Serve requests
//!
//! ```rust,ignore
//! let manager = TenantDatabaseManager::new(TenantRegistry::new(store), cache.clone());
//! let conn = manager.get_connection(&TenantKey::slug("acme")).await?;
//! ```
//!
//! ## 5. Shut down
//!
//! ```rust,ignore
//! LifecycleManager::new(cache).shutdown().await;
//! ```

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod factory;
pub mod handle;
pub mod lifecycle;
pub mod management;
pub mod provisioner;
pub mod registry;
pub mod schema;
pub mod store;
pub mod tenant;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::{ConnectionCache, DrainReport};
pub use config::{Credentials, PoolConfig, ResolvedCredentials, TenancyConfig, TlsMode};
pub use database::TenantDatabaseManager;
pub use error::{TenantError, TenantResult};
pub use factory::{ConnectionFactory, SeaOrmClient, SeaOrmConnectionFactory, StoreClient};
pub use handle::ConnectionHandle;
pub use lifecycle::LifecycleManager;
pub use management::TenantAdministration;
pub use provisioner::{CreateTenantRequest, Provisioner, DEFAULT_MAX_USERS};
pub use registry::{InMemoryTenantStore, TenantRegistry, TenantStore};
pub use schema::{SchemaScript, SeedData};
pub use store::SeaOrmTenantStore;
pub use tenant::{normalize_slug, StoreNaming, TenantKey, TenantRecord, TenantStatus};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::ConnectionCache;
    pub use crate::config::{Credentials, PoolConfig, TenancyConfig};
    pub use crate::database::TenantDatabaseManager;
    pub use crate::error::{TenantError, TenantResult};
    pub use crate::factory::{ConnectionFactory, SeaOrmConnectionFactory, StoreClient};
    pub use crate::lifecycle::LifecycleManager;
    pub use crate::management::TenantAdministration;
    pub use crate::provisioner::{CreateTenantRequest, Provisioner};
    pub use crate::registry::{TenantRegistry, TenantStore};
    pub use crate::tenant::{TenantKey, TenantRecord, TenantStatus};
}
