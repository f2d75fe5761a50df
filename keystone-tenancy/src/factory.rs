//! Connection Factory
//!
//! Builds a pooled client for one physical store. The factory resolves
//! credentials once and holds no mutable state; every `build` opens a new
//! pool and nothing is cached here.
//!
//! # Usage
//!
//! ```rust,ignore
//! let credentials = Credentials::from_url(std::env::var("DATABASE_URL")?);
//! let factory = SeaOrmConnectionFactory::new(&credentials, PoolConfig::default())?;
//!
//! let handle = factory.build("tenant_acme").await?;
//! let rows = handle.connection().query_all(statement).await?;
//! ```

use crate::config::{Credentials, PoolConfig, ResolvedCredentials};
use crate::error::{TenantError, TenantResult};
use crate::handle::ConnectionHandle;
use async_trait::async_trait;
use keystone_log::{debug, info, warn};
use sea_orm::{ConnectOptions, ConnectionTrait, DatabaseConnection, Statement, Value};
use std::sync::Arc;

/// Operations the core needs from a pooled store client.
///
/// Implemented for SeaORM connections; tests substitute a recording stub.
#[async_trait]
pub trait StoreClient: Send + Sync + 'static {
    /// Run one statement without bind parameters (DDL, `CREATE DATABASE`).
    async fn execute_unprepared(&self, sql: &str) -> TenantResult<()>;

    /// Run one statement with positional bind values; returns rows affected.
    async fn execute(&self, sql: &str, values: Vec<Value>) -> TenantResult<u64>;

    /// Round-trip to the server.
    async fn ping(&self) -> TenantResult<()>;

    /// Close the pool. Connections in use finish first.
    async fn close(&self) -> TenantResult<()>;
}

/// Builds store handles.
///
/// `build` performs network I/O and must honor the configured connect
/// timeout. It never retries.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Client type carried by the handles this factory builds.
    type Client: StoreClient;

    /// Open a pool to `store_name` and return an initialized handle.
    async fn build(&self, store_name: &str) -> TenantResult<ConnectionHandle<Self::Client>>;
}

/// SeaORM connection to one store.
///
/// Clones share the pool.
#[derive(Clone)]
pub struct SeaOrmClient {
    conn: Arc<DatabaseConnection>,
}

impl SeaOrmClient {
    /// Wrap an existing connection.
    pub fn new(conn: impl Into<Arc<DatabaseConnection>>) -> Self {
        Self { conn: conn.into() }
    }

    /// Borrow the SeaORM connection for entity and raw queries.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Shared ownership of the connection, for stores that outlive a borrow.
    pub fn shared(&self) -> Arc<DatabaseConnection> {
        Arc::clone(&self.conn)
    }
}

impl std::ops::Deref for SeaOrmClient {
    type Target = DatabaseConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

#[async_trait]
impl StoreClient for SeaOrmClient {
    async fn execute_unprepared(&self, sql: &str) -> TenantResult<()> {
        self.conn.execute_unprepared(sql).await?;
        Ok(())
    }

    async fn execute(&self, sql: &str, values: Vec<Value>) -> TenantResult<u64> {
        let statement =
            Statement::from_sql_and_values(self.conn.get_database_backend(), sql, values);
        Ok(self.conn.execute(statement).await?.rows_affected())
    }

    async fn ping(&self) -> TenantResult<()> {
        self.conn
            .ping()
            .await
            .map_err(|e| TenantError::Connection(e.to_string()))
    }

    async fn close(&self) -> TenantResult<()> {
        self.conn
            .close_by_ref()
            .await
            .map_err(|e| TenantError::Eviction(e.to_string()))
    }
}

/// Factory backed by `sea_orm::Database::connect`.
#[derive(Debug, Clone)]
pub struct SeaOrmConnectionFactory {
    credentials: ResolvedCredentials,
    pool: PoolConfig,
}

impl SeaOrmConnectionFactory {
    /// Resolve `credentials` against the pool's TLS flag and create a factory.
    pub fn new(credentials: &Credentials, pool: PoolConfig) -> TenantResult<Self> {
        let credentials = credentials.resolve(pool.ssl_required)?;
        Ok(Self { credentials, pool })
    }

    /// Resolved credentials.
    pub fn credentials(&self) -> &ResolvedCredentials {
        &self.credentials
    }

    /// Pool limits applied to every handle.
    pub fn pool_config(&self) -> &PoolConfig {
        &self.pool
    }

    fn connect_options(&self, store_name: &str) -> ConnectOptions {
        let mut options = ConnectOptions::new(self.credentials.connection_url(store_name));
        options
            .max_connections(self.pool.max_connections)
            .min_connections(self.pool.min_connections)
            .connect_timeout(self.pool.connect_timeout)
            .acquire_timeout(self.pool.connect_timeout)
            .idle_timeout(self.pool.idle_timeout)
            .sqlx_logging(false);
        options
    }
}

#[async_trait]
impl ConnectionFactory for SeaOrmConnectionFactory {
    type Client = SeaOrmClient;

    async fn build(&self, store_name: &str) -> TenantResult<ConnectionHandle<SeaOrmClient>> {
        if store_name.trim().is_empty() {
            return Err(TenantError::Invalid("store name is empty".to_string()));
        }

        info!(
            fields: [store = store_name, tls = self.credentials.tls.ssl_mode()],
            "Opening connection pool"
        );
        debug!("Pool URL: {}", self.credentials.redacted_url(store_name));

        let options = self.connect_options(store_name);
        let timeout = self.pool.connect_timeout;
        let connect = async {
            let conn = sea_orm::Database::connect(options)
                .await
                .map_err(|e| TenantError::Connection(e.to_string()))?;
            let client = SeaOrmClient::new(conn);
            if let Err(e) = client.ping().await {
                let _ = client.close().await;
                return Err(e);
            }
            Ok(client)
        };

        let client = match tokio::time::timeout(timeout, connect).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                warn!(fields: [store = store_name], "Connection failed: {}", e);
                return Err(e);
            }
            Err(_) => {
                warn!(fields: [store = store_name], "Connection timed out after {:?}", timeout);
                return Err(TenantError::Connection(format!(
                    "connecting to {} timed out after {:?}",
                    store_name, timeout
                )));
            }
        };

        info!(fields: [store = store_name], "Connection pool ready");
        Ok(ConnectionHandle::new(store_name, client, self.pool.clone(), self.credentials.tls)
            .initialized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsMode;
    use std::time::Duration;

    fn factory(url: &str, ssl: bool) -> SeaOrmConnectionFactory {
        SeaOrmConnectionFactory::new(
            &Credentials::from_url(url),
            PoolConfig::default().ssl_required(ssl),
        )
        .unwrap()
    }

    #[test]
    fn test_localhost_url_disables_tls_even_when_required() {
        let factory = factory("postgres://app:pw@localhost:5432/main", true);
        assert_eq!(factory.credentials().tls, TlsMode::Disabled);
        assert!(factory.connect_options("tenant_acme").get_url().ends_with("sslmode=disable"));
    }

    #[test]
    fn test_remote_url_requires_tls() {
        let factory = factory("postgres://app:pw@db.example.com:5432/main", true);
        assert_eq!(factory.credentials().tls, TlsMode::Relaxed);
        let options = factory.connect_options("tenant_acme");
        assert_eq!(
            options.get_url(),
            "postgres://app:pw@db.example.com:5432/tenant_acme?sslmode=require"
        );
    }

    #[test]
    fn test_pool_limits_reach_connect_options() {
        let pool = PoolConfig::default()
            .max_connections(7)
            .min_connections(2)
            .connect_timeout(Duration::from_secs(3));
        let factory = SeaOrmConnectionFactory::new(&Credentials::default(), pool).unwrap();
        let options = factory.connect_options("tenant_acme");
        assert_eq!(options.get_max_connections(), Some(7));
        assert_eq!(options.get_min_connections(), Some(2));
        assert_eq!(options.get_connect_timeout(), Some(Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn test_client_clones_share_one_connection() {
        let conn = sea_orm::MockDatabase::new(sea_orm::DbBackend::Postgres)
            .append_exec_results([sea_orm::MockExecResult {
                last_insert_id: 0,
                rows_affected: 3,
            }])
            .into_connection();
        let client = SeaOrmClient::new(conn);
        let other = client.clone();

        assert!(Arc::ptr_eq(&client.shared(), &other.shared()));
        let affected = other
            .execute("UPDATE users SET active = $1", vec![true.into()])
            .await
            .unwrap();
        assert_eq!(affected, 3);
        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_store_name_rejected() {
        let factory = factory("postgres://app:pw@localhost/main", false);
        assert!(matches!(
            factory.build("  ").await,
            Err(TenantError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_connection_error() {
        // Port 1 on loopback refuses immediately
        let factory = SeaOrmConnectionFactory::new(
            &Credentials::from_url("postgres://app:pw@127.0.0.1:1/main"),
            PoolConfig::default().connect_timeout(Duration::from_secs(2)),
        )
        .unwrap();
        assert!(matches!(
            factory.build("tenant_acme").await,
            Err(TenantError::Connection(_))
        ));
    }
}
