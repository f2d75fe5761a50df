//! Error types for tenant resolution, connection management, and provisioning.

use thiserror::Error;

/// Errors surfaced by the tenancy core.
///
/// Every variant carries plain strings so a single build failure can be
/// handed to every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TenantError {
    /// No tenant record for the given key.
    #[error("Tenant not found: {0}")]
    NotFound(String),

    /// Slug already registered.
    #[error("Tenant slug already exists: {0}")]
    Conflict(String),

    /// A physical store could not be reached or rejected the credentials.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Schema application or store creation failed during provisioning.
    #[error("Provisioning error: {0}")]
    Provisioning(String),

    /// Closing a handle failed. Logged by the cache, never returned from it.
    #[error("Eviction error: {0}")]
    Eviction(String),

    /// Slug does not satisfy the naming rules.
    #[error("Invalid tenant slug '{slug}': {reason}")]
    InvalidSlug {
        /// The rejected input.
        slug: String,
        /// Which rule it broke.
        reason: String,
    },

    /// Malformed argument.
    #[error("Invalid argument: {0}")]
    Invalid(String),

    /// Tenant exists but its subscription does not allow access.
    #[error("Tenant {tenant} is {status}")]
    Inactive {
        /// Tenant id.
        tenant: String,
        /// Current subscription status.
        status: String,
    },

    /// Control-plane store query failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The connection cache has been drained.
    #[error("Connection cache is shut down")]
    ShuttingDown,

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result alias for tenancy operations.
pub type TenantResult<T> = Result<T, TenantError>;

impl TenantError {
    /// HTTP status a request handler should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            TenantError::NotFound(_) => 404,
            TenantError::Conflict(_) => 409,
            TenantError::InvalidSlug { .. } | TenantError::Invalid(_) => 400,
            TenantError::Inactive { .. } => 403,
            TenantError::Connection(_) | TenantError::ShuttingDown => 503,
            TenantError::Provisioning(_)
            | TenantError::Eviction(_)
            | TenantError::Storage(_)
            | TenantError::Config(_) => 500,
        }
    }

    /// Whether retrying the same call later (with backoff) can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, TenantError::Connection(_))
    }
}

impl From<sea_orm::DbErr> for TenantError {
    fn from(err: sea_orm::DbErr) -> Self {
        match err {
            sea_orm::DbErr::Conn(e) => TenantError::Connection(e.to_string()),
            sea_orm::DbErr::ConnectionAcquire(e) => TenantError::Connection(e.to_string()),
            other => TenantError::Storage(other.to_string()),
        }
    }
}

impl From<keystone_config::ConfigError> for TenantError {
    fn from(err: keystone_config::ConfigError) -> Self {
        TenantError::Config(err.to_string())
    }
}
