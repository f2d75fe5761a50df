//! Tenant Records
//!
//! The control-plane view of a tenant, the keys callers use to find one, and
//! the deterministic slug → physical store naming convention.

use crate::error::{TenantError, TenantResult};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Longest slug accepted at signup.
pub const MAX_SLUG_LEN: usize = 48;

/// PostgreSQL truncates identifiers beyond this many bytes.
const MAX_IDENTIFIER_LEN: usize = 63;

static SLUG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9_-]*$").unwrap_or_else(|e| panic!("slug pattern: {e}"))
});

static PREFIX_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z_][a-z0-9_]*$").unwrap_or_else(|e| panic!("prefix pattern: {e}"))
});

/// Subscription status of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    /// Newly provisioned, evaluation period
    #[default]
    Trial,
    /// Paying and operational
    Active,
    /// Administratively blocked
    Suspended,
    /// Subscription lapsed
    Expired,
}

impl TenantStatus {
    /// Status as stored in the `subscription_status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trial => "trial",
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Expired => "expired",
        }
    }

    /// Whether request handlers may open the tenant's store.
    pub fn allows_access(&self) -> bool {
        matches!(self, Self::Trial | Self::Active)
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantStatus {
    type Err = TenantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trial" => Ok(Self::Trial),
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "expired" => Ok(Self::Expired),
            other => Err(TenantError::Storage(format!(
                "unknown subscription status '{}'",
                other
            ))),
        }
    }
}

/// How a caller identifies a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TenantKey {
    /// Stable tenant id
    Id(String),
    /// Human-chosen slug
    Slug(String),
}

impl TenantKey {
    /// Key by tenant id.
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    /// Key by slug.
    pub fn slug(slug: impl Into<String>) -> Self {
        Self::Slug(slug.into())
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id:{}", id),
            Self::Slug(slug) => write!(f, "slug:{}", slug),
        }
    }
}

/// A row of the control-plane `tenants` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    /// Unique, stable identifier
    pub id: String,
    /// Unique, human-chosen slug
    pub slug: String,
    /// Physical store name, derived from the slug
    pub database_name: String,
    /// Subscription status
    #[serde(rename = "subscription_status")]
    pub status: TenantStatus,
    /// Seat limit
    pub max_users: i32,
    /// Registration time
    pub created_at: DateTime<Utc>,
}

impl TenantRecord {
    /// Create a fresh `trial` record with a generated id.
    pub fn new_trial(slug: impl Into<String>, database_name: impl Into<String>, max_users: i32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            slug: slug.into(),
            database_name: database_name.into(),
            status: TenantStatus::Trial,
            max_users,
            created_at: Utc::now(),
        }
    }

    /// Whether this record answers to `key`.
    pub fn matches(&self, key: &TenantKey) -> bool {
        match key {
            TenantKey::Id(id) => &self.id == id,
            TenantKey::Slug(slug) => &self.slug == slug,
        }
    }
}

/// Normalize and validate a signup slug.
///
/// The slug is trimmed and lowercased; the result must start with an
/// alphanumeric and contain only `[a-z0-9_-]`.
pub fn normalize_slug(raw: &str) -> TenantResult<String> {
    let slug = raw.trim().to_lowercase();
    let reject = |reason: &str| TenantError::InvalidSlug {
        slug: raw.to_string(),
        reason: reason.to_string(),
    };

    if slug.is_empty() {
        return Err(reject("empty"));
    }
    if slug.len() > MAX_SLUG_LEN {
        return Err(reject(&format!("longer than {} characters", MAX_SLUG_LEN)));
    }
    if !SLUG_PATTERN.is_match(&slug) {
        return Err(reject(
            "must start with a letter or digit and contain only a-z, 0-9, '-', '_'",
        ));
    }
    Ok(slug)
}

/// Deterministic mapping from slug to physical store name.
///
/// Reproducible without the control plane, so a handle cached under the
/// derived name can be reached without a registry round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreNaming {
    prefix: String,
}

impl StoreNaming {
    /// Default prefix for tenant databases.
    pub const DEFAULT_PREFIX: &'static str = "tenant_";

    /// Create a naming scheme with a custom prefix.
    pub fn new(prefix: impl Into<String>) -> TenantResult<Self> {
        let prefix = prefix.into();
        if !PREFIX_PATTERN.is_match(&prefix) {
            return Err(TenantError::Config(format!(
                "store prefix '{}' must match [a-z_][a-z0-9_]*",
                prefix
            )));
        }
        if prefix.len() + MAX_SLUG_LEN > MAX_IDENTIFIER_LEN {
            return Err(TenantError::Config(format!(
                "store prefix '{}' leaves no room for a {}-character slug",
                prefix, MAX_SLUG_LEN
            )));
        }
        Ok(Self { prefix })
    }

    /// The configured prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Physical store name for a slug: prefix + slug with `-` mapped to `_`.
    pub fn store_name(&self, slug: &str) -> TenantResult<String> {
        let slug = normalize_slug(slug)?;
        Ok(format!("{}{}", self.prefix, slug.replace('-', "_")))
    }
}

impl Default for StoreNaming {
    fn default() -> Self {
        Self {
            prefix: Self::DEFAULT_PREFIX.to_string(),
        }
    }
}
