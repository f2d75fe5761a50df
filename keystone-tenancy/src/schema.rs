//! Tenant Schema
//!
//! The fixed, versioned DDL script applied to every new tenant store, the
//! default seed rows, and the administrative statements that create and drop
//! physical stores.

use crate::error::{TenantError, TenantResult};
use crate::factory::StoreClient;
use keystone_log::{debug, info};
use sea_orm::Value;

/// Quote an identifier for PostgreSQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `CREATE DATABASE` for a physical store.
pub fn create_database_sql(store_name: &str) -> String {
    format!("CREATE DATABASE {}", quote_ident(store_name))
}

/// `DROP DATABASE IF EXISTS` for a physical store.
pub fn drop_database_sql(store_name: &str) -> String {
    format!("DROP DATABASE IF EXISTS {}", quote_ident(store_name))
}

const V1_STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
)"#,
    r#"CREATE TABLE IF NOT EXISTS company_profile (
    id SMALLINT PRIMARY KEY CHECK (id = 1),
    company_name VARCHAR(255) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)"#,
    r#"CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    email VARCHAR(255) NOT NULL UNIQUE,
    full_name VARCHAR(255) NOT NULL,
    role VARCHAR(32) NOT NULL DEFAULT 'employee',
    password_hash VARCHAR(255),
    password_set BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)"#,
    r#"CREATE TABLE IF NOT EXISTS categories (
    id SERIAL PRIMARY KEY,
    name VARCHAR(128) NOT NULL UNIQUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)"#,
    r#"CREATE TABLE IF NOT EXISTS leave_types (
    id SERIAL PRIMARY KEY,
    name VARCHAR(128) NOT NULL UNIQUE,
    days_per_year INTEGER NOT NULL DEFAULT 0,
    paid BOOLEAN NOT NULL DEFAULT TRUE
)"#,
    r#"CREATE TABLE IF NOT EXISTS employees (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    user_id UUID REFERENCES users(id) ON DELETE SET NULL,
    category_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
    employee_code VARCHAR(64) NOT NULL UNIQUE,
    full_name VARCHAR(255) NOT NULL,
    email VARCHAR(255),
    base_salary NUMERIC(14, 2) NOT NULL DEFAULT 0,
    hired_on DATE,
    active BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)"#,
    r#"CREATE TABLE IF NOT EXISTS attendance (
    id BIGSERIAL PRIMARY KEY,
    employee_id UUID NOT NULL REFERENCES employees(id) ON DELETE CASCADE,
    work_date DATE NOT NULL,
    check_in TIMESTAMPTZ,
    check_out TIMESTAMPTZ,
    UNIQUE (employee_id, work_date)
)"#,
    r#"CREATE TABLE IF NOT EXISTS leave_requests (
    id BIGSERIAL PRIMARY KEY,
    employee_id UUID NOT NULL REFERENCES employees(id) ON DELETE CASCADE,
    leave_type_id INTEGER NOT NULL REFERENCES leave_types(id),
    starts_on DATE NOT NULL,
    ends_on DATE NOT NULL,
    status VARCHAR(16) NOT NULL DEFAULT 'pending',
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CHECK (ends_on >= starts_on)
)"#,
    r#"CREATE TABLE IF NOT EXISTS payroll_runs (
    id BIGSERIAL PRIMARY KEY,
    period_start DATE NOT NULL,
    period_end DATE NOT NULL,
    status VARCHAR(16) NOT NULL DEFAULT 'draft',
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (period_start, period_end)
)"#,
    r#"CREATE TABLE IF NOT EXISTS payslips (
    id BIGSERIAL PRIMARY KEY,
    payroll_run_id BIGINT NOT NULL REFERENCES payroll_runs(id) ON DELETE CASCADE,
    employee_id UUID NOT NULL REFERENCES employees(id) ON DELETE CASCADE,
    gross NUMERIC(14, 2) NOT NULL,
    deductions NUMERIC(14, 2) NOT NULL DEFAULT 0,
    net NUMERIC(14, 2) NOT NULL,
    UNIQUE (payroll_run_id, employee_id)
)"#,
    "CREATE INDEX IF NOT EXISTS idx_employees_category ON employees (category_id)",
    "CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance (work_date)",
    "CREATE INDEX IF NOT EXISTS idx_leave_requests_employee ON leave_requests (employee_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_payslips_employee ON payslips (employee_id)",
];

/// Ordered DDL applied to a new tenant store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaScript {
    version: i32,
    statements: &'static [&'static str],
}

impl SchemaScript {
    /// The schema every new tenant receives.
    pub const fn current() -> Self {
        Self {
            version: 1,
            statements: V1_STATEMENTS,
        }
    }

    /// Script version, recorded in `schema_version`.
    pub fn version(&self) -> i32 {
        self.version
    }

    /// Statements in execution order.
    pub fn statements(&self) -> &'static [&'static str] {
        self.statements
    }

    /// Run every statement in order, then record the version.
    ///
    /// Stops at the first failure and reports which statement broke.
    pub async fn apply<C: StoreClient + ?Sized>(&self, client: &C) -> TenantResult<()> {
        for (index, sql) in self.statements.iter().enumerate() {
            debug!(fields: [step = index + 1, total = self.statements.len()], "Applying schema statement");
            client.execute_unprepared(sql).await.map_err(|e| {
                TenantError::Provisioning(format!(
                    "schema v{} statement {} failed: {}",
                    self.version,
                    index + 1,
                    e
                ))
            })?;
        }

        client
            .execute(
                "INSERT INTO schema_version (version) VALUES ($1) ON CONFLICT (version) DO NOTHING",
                vec![self.version.into()],
            )
            .await
            .map_err(|e| TenantError::Provisioning(format!("recording schema version: {}", e)))?;

        info!(fields: [version = self.version], "Schema applied");
        Ok(())
    }
}

impl Default for SchemaScript {
    fn default() -> Self {
        Self::current()
    }
}

/// Category rows every tenant starts with.
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "Engineering",
    "Sales",
    "Operations",
    "Human Resources",
    "Finance",
];

/// Leave types every tenant starts with: name, days per year, paid.
pub const DEFAULT_LEAVE_TYPES: &[(&str, i32, bool)] = &[
    ("Annual Leave", 20, true),
    ("Sick Leave", 10, true),
    ("Unpaid Leave", 0, false),
];

/// Initial rows for a tenant store. Safe to apply more than once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedData {
    /// Company shown in the tenant's profile
    pub company_name: String,
    /// Administrator login
    pub admin_email: String,
    /// Administrator display name
    pub admin_name: String,
}

impl SeedData {
    /// Seed for one tenant.
    pub fn new(
        company_name: impl Into<String>,
        admin_email: impl Into<String>,
        admin_name: impl Into<String>,
    ) -> Self {
        Self {
            company_name: company_name.into(),
            admin_email: admin_email.into(),
            admin_name: admin_name.into(),
        }
    }

    fn statements(&self) -> Vec<(&'static str, Vec<Value>)> {
        let mut statements = vec![
            (
                "INSERT INTO company_profile (id, company_name) VALUES (1, $1) ON CONFLICT (id) DO NOTHING",
                vec![self.company_name.clone().into()],
            ),
            (
                "INSERT INTO users (email, full_name, role, password_set) VALUES ($1, $2, 'admin', FALSE) ON CONFLICT (email) DO NOTHING",
                vec![self.admin_email.clone().into(), self.admin_name.clone().into()],
            ),
        ];
        for name in DEFAULT_CATEGORIES {
            statements.push((
                "INSERT INTO categories (name) VALUES ($1) ON CONFLICT (name) DO NOTHING",
                vec![(*name).into()],
            ));
        }
        for (name, days, paid) in DEFAULT_LEAVE_TYPES {
            statements.push((
                "INSERT INTO leave_types (name, days_per_year, paid) VALUES ($1, $2, $3) ON CONFLICT (name) DO NOTHING",
                vec![(*name).into(), (*days).into(), (*paid).into()],
            ));
        }
        statements
    }

    /// Insert the administrator, default categories, and default leave types.
    pub async fn apply<C: StoreClient + ?Sized>(&self, client: &C) -> TenantResult<()> {
        for (sql, values) in self.statements() {
            client.execute(sql, values).await?;
        }
        debug!(fields: [admin = self.admin_email], "Seed data applied");
        Ok(())
    }
}
