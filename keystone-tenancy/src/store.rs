//! SeaORM-backed control-plane store.
//!
//! Raw SQL over the `tenants` table; every mutation touches one row.

use crate::error::{TenantError, TenantResult};
use crate::registry::TenantStore;
use crate::tenant::{TenantKey, TenantRecord, TenantStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keystone_log::{debug, info};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, QueryResult, SqlErr, Statement, Value};
use std::sync::Arc;

const COLUMNS: &str = "id, slug, database_name, subscription_status, max_users, created_at";

const CREATE_TENANTS_TABLE: &str = r#"CREATE TABLE IF NOT EXISTS tenants (
    id VARCHAR(36) PRIMARY KEY,
    slug VARCHAR(64) NOT NULL UNIQUE,
    database_name VARCHAR(63) NOT NULL UNIQUE,
    subscription_status VARCHAR(16) NOT NULL DEFAULT 'trial'
        CHECK (subscription_status IN ('trial', 'active', 'suspended', 'expired')),
    max_users INTEGER NOT NULL DEFAULT 10,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)"#;

/// Tenant store over a SeaORM connection to the control-plane database.
#[derive(Clone)]
pub struct SeaOrmTenantStore {
    conn: Arc<DatabaseConnection>,
}

impl SeaOrmTenantStore {
    /// Wrap a control-plane connection.
    pub fn new(conn: impl Into<Arc<DatabaseConnection>>) -> Self {
        Self { conn: conn.into() }
    }

    /// Create the `tenants` table if it does not exist.
    pub async fn ensure_table(&self) -> TenantResult<()> {
        self.conn.execute_unprepared(CREATE_TENANTS_TABLE).await?;
        info!("Control-plane tenants table ready");
        Ok(())
    }

    fn statement(sql: String, values: Vec<Value>) -> Statement {
        Statement::from_sql_and_values(DbBackend::Postgres, sql, values)
    }

    fn record_from_row(row: &QueryResult) -> TenantResult<TenantRecord> {
        let status: String = row.try_get("", "subscription_status")?;
        let created_at: DateTime<Utc> = row.try_get("", "created_at")?;
        Ok(TenantRecord {
            id: row.try_get("", "id")?,
            slug: row.try_get("", "slug")?,
            database_name: row.try_get("", "database_name")?,
            status: status.parse()?,
            max_users: row.try_get("", "max_users")?,
            created_at,
        })
    }
}

#[async_trait]
impl TenantStore for SeaOrmTenantStore {
    async fn find(&self, key: &TenantKey) -> TenantResult<Option<TenantRecord>> {
        let (column, value) = match key {
            TenantKey::Id(id) => ("id", id),
            TenantKey::Slug(slug) => ("slug", slug),
        };
        let sql = format!("SELECT {} FROM tenants WHERE {} = $1", COLUMNS, column);
        let row = self
            .conn
            .query_one(Self::statement(sql, vec![value.clone().into()]))
            .await?;
        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn find_by_store(&self, database_name: &str) -> TenantResult<Option<TenantRecord>> {
        let sql = format!("SELECT {} FROM tenants WHERE database_name = $1", COLUMNS);
        let row = self
            .conn
            .query_one(Self::statement(sql, vec![database_name.into()]))
            .await?;
        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn insert(&self, record: &TenantRecord) -> TenantResult<()> {
        let sql = format!(
            "INSERT INTO tenants ({}) VALUES ($1, $2, $3, $4, $5, $6)",
            COLUMNS
        );
        let values = vec![
            record.id.clone().into(),
            record.slug.clone().into(),
            record.database_name.clone().into(),
            record.status.as_str().into(),
            record.max_users.into(),
            record.created_at.into(),
        ];

        match self.conn.execute(Self::statement(sql, values)).await {
            Ok(_) => {
                debug!(fields: [tenant = record.id, slug = record.slug], "Tenant row inserted");
                Ok(())
            }
            Err(e) => match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => {
                    Err(TenantError::Conflict(record.slug.clone()))
                }
                _ => Err(e.into()),
            },
        }
    }

    async fn delete(&self, id: &str) -> TenantResult<bool> {
        let result = self
            .conn
            .execute(Self::statement(
                "DELETE FROM tenants WHERE id = $1".to_string(),
                vec![id.into()],
            ))
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_status(&self, id: &str, status: TenantStatus) -> TenantResult<TenantRecord> {
        let sql = format!(
            "UPDATE tenants SET subscription_status = $1 WHERE id = $2 RETURNING {}",
            COLUMNS
        );
        let row = self
            .conn
            .query_one(Self::statement(sql, vec![status.as_str().into(), id.into()]))
            .await?
            .ok_or_else(|| TenantError::NotFound(id.to_string()))?;
        Self::record_from_row(&row)
    }

    async fn list_by_status(&self, status: TenantStatus) -> TenantResult<Vec<TenantRecord>> {
        let sql = format!(
            "SELECT {} FROM tenants WHERE subscription_status = $1",
            COLUMNS
        );
        self.conn
            .query_all(Self::statement(sql, vec![status.as_str().into()]))
            .await?
            .iter()
            .map(Self::record_from_row)
            .collect()
    }
}

impl std::fmt::Debug for SeaOrmTenantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeaOrmTenantStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{MockDatabase, MockExecResult};
    use std::collections::BTreeMap;

    fn row(record: &TenantRecord) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([
            ("id", record.id.clone().into()),
            ("slug", record.slug.clone().into()),
            ("database_name", record.database_name.clone().into()),
            ("subscription_status", record.status.as_str().into()),
            ("max_users", record.max_users.into()),
            ("created_at", record.created_at.into()),
        ])
    }

    #[tokio::test]
    async fn test_find_maps_columns() {
        let record = TenantRecord::new_trial("acme", "tenant_acme", 10);
        let conn = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![row(&record)]])
            .into_connection();
        let store = SeaOrmTenantStore::new(conn);

        let found = store.find(&TenantKey::slug("acme")).await.unwrap();
        assert_eq!(found, Some(record));
    }

    #[tokio::test]
    async fn test_find_missing_row() {
        let conn = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([Vec::<BTreeMap<&str, Value>>::new()])
            .into_connection();
        let store = SeaOrmTenantStore::new(conn);

        assert_eq!(store.find(&TenantKey::id("nope")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_insert_binds_every_column() {
        let record = TenantRecord::new_trial("acme", "tenant_acme", 10);
        let conn = MockDatabase::new(DbBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        let conn = Arc::new(conn);
        let store = SeaOrmTenantStore::new(Arc::clone(&conn));

        store.insert(&record).await.unwrap();
        drop(store);

        let log = Arc::try_unwrap(conn).ok().unwrap().into_transaction_log();
        assert_eq!(log.len(), 1);
        let sql = format!("{:?}", log[0]);
        assert!(sql.contains("INSERT INTO tenants"));
        assert!(sql.contains("tenant_acme"));
    }

    #[tokio::test]
    async fn test_find_by_store_name() {
        let record = TenantRecord::new_trial("acme-corp", "tenant_acme_corp", 10);
        let conn = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![row(&record)]])
            .into_connection();
        let store = SeaOrmTenantStore::new(conn);

        let found = store.find_by_store("tenant_acme_corp").await.unwrap();
        assert_eq!(found.map(|t| t.slug), Some("acme-corp".to_string()));
    }

    #[tokio::test]
    async fn test_update_status_missing_row_is_not_found() {
        let conn = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([Vec::<BTreeMap<&str, Value>>::new()])
            .into_connection();
        let store = SeaOrmTenantStore::new(conn);

        assert!(matches!(
            store.update_status("nope", TenantStatus::Suspended).await,
            Err(TenantError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_status_text_is_storage_error() {
        let record = TenantRecord::new_trial("acme", "tenant_acme", 10);
        let mut bad = row(&record);
        bad.insert("subscription_status", "deleted".into());
        let conn = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![bad]])
            .into_connection();
        let store = SeaOrmTenantStore::new(conn);

        assert!(matches!(
            store.find(&TenantKey::slug("acme")).await,
            Err(TenantError::Storage(_))
        ));
    }
}
