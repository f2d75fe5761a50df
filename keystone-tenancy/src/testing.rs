//! Test doubles for the store layer.
//!
//! `StubConnectionFactory` counts builds and can be told to fail or stall;
//! `StubClient` records every statement it is given. Available to this
//! crate's tests and, behind the `testing` feature, to downstream crates.

use crate::config::{PoolConfig, TlsMode};
use crate::error::{TenantError, TenantResult};
use crate::factory::{ConnectionFactory, StoreClient};
use crate::handle::ConnectionHandle;
use async_trait::async_trait;
use parking_lot::Mutex;
use sea_orm::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct ClientState {
    executed: Mutex<Vec<String>>,
    fail_on: Mutex<Vec<String>>,
    close_calls: AtomicUsize,
    fail_close: AtomicBool,
}

/// Recording client. Clones share state.
#[derive(Clone)]
pub struct StubClient {
    store_name: String,
    state: Arc<ClientState>,
}

impl StubClient {
    /// A client that accepts everything.
    pub fn new(store_name: impl Into<String>) -> Self {
        Self {
            store_name: store_name.into(),
            state: Arc::new(ClientState::default()),
        }
    }

    /// Fail any statement containing `fragment`.
    pub fn fail_on(&self, fragment: impl Into<String>) {
        self.state.fail_on.lock().push(fragment.into());
    }

    /// Make `close` return an error.
    pub fn fail_close(&self) {
        self.state.fail_close.store(true, Ordering::SeqCst);
    }

    /// Store this client was built for.
    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    /// Statements that ran successfully, in order.
    pub fn executed(&self) -> Vec<String> {
        self.state.executed.lock().clone()
    }

    /// Whether any successful statement contains `fragment`.
    pub fn ran(&self, fragment: &str) -> bool {
        self.state
            .executed
            .lock()
            .iter()
            .any(|sql| sql.contains(fragment))
    }

    /// How many times `close` reached this client.
    pub fn close_calls(&self) -> usize {
        self.state.close_calls.load(Ordering::SeqCst)
    }

    fn record(&self, sql: &str) -> TenantResult<()> {
        let failing = self
            .state
            .fail_on
            .lock()
            .iter()
            .find(|fragment| sql.contains(fragment.as_str()))
            .cloned();
        if let Some(fragment) = failing {
            return Err(TenantError::Storage(format!(
                "{}: statement rejected ({})",
                self.store_name, fragment
            )));
        }
        self.state.executed.lock().push(sql.to_string());
        Ok(())
    }
}

#[async_trait]
impl StoreClient for StubClient {
    async fn execute_unprepared(&self, sql: &str) -> TenantResult<()> {
        self.record(sql)
    }

    async fn execute(&self, sql: &str, _values: Vec<Value>) -> TenantResult<u64> {
        self.record(sql)?;
        Ok(1)
    }

    async fn ping(&self) -> TenantResult<()> {
        Ok(())
    }

    async fn close(&self) -> TenantResult<()> {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_close.load(Ordering::SeqCst) {
            return Err(TenantError::Eviction(format!(
                "{}: close refused",
                self.store_name
            )));
        }
        Ok(())
    }
}

/// Call-counting factory producing [`StubClient`]s.
#[derive(Default)]
pub struct StubConnectionFactory {
    builds: AtomicUsize,
    per_store: Mutex<HashMap<String, usize>>,
    clients: Mutex<HashMap<String, Vec<StubClient>>>,
    unreachable: Mutex<HashSet<String>>,
    fail_sql: Mutex<Vec<String>>,
    fail_close: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    pool: PoolConfig,
}

impl StubConnectionFactory {
    /// A factory where every store is reachable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds for `store_name` fail with a connection error.
    pub fn unreachable(self, store_name: impl Into<String>) -> Self {
        self.unreachable.lock().insert(store_name.into());
        self
    }

    /// Every client built from now on rejects statements containing `fragment`.
    pub fn fail_sql_containing(self, fragment: impl Into<String>) -> Self {
        self.fail_sql.lock().push(fragment.into());
        self
    }

    /// Clients built for `store_name` fail to close.
    pub fn fail_close_for(self, store_name: impl Into<String>) -> Self {
        self.fail_close.lock().insert(store_name.into());
        self
    }

    /// Stall every build for `delay` before completing.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock() = Some(delay);
        self
    }

    /// Total builds started.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// Builds started for one store.
    pub fn builds_for(&self, store_name: &str) -> usize {
        self.per_store.lock().get(store_name).copied().unwrap_or(0)
    }

    /// Most recent client built for `store_name`.
    pub fn client(&self, store_name: &str) -> Option<StubClient> {
        self.clients
            .lock()
            .get(store_name)
            .and_then(|clients| clients.last().cloned())
    }

    /// Every client built for `store_name`, oldest first.
    pub fn clients(&self, store_name: &str) -> Vec<StubClient> {
        self.clients
            .lock()
            .get(store_name)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ConnectionFactory for StubConnectionFactory {
    type Client = StubClient;

    async fn build(&self, store_name: &str) -> TenantResult<ConnectionHandle<StubClient>> {
        if store_name.trim().is_empty() {
            return Err(TenantError::Invalid("store name is empty".to_string()));
        }

        self.builds.fetch_add(1, Ordering::SeqCst);
        *self
            .per_store
            .lock()
            .entry(store_name.to_string())
            .or_insert(0) += 1;

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.unreachable.lock().contains(store_name) {
            return Err(TenantError::Connection(format!(
                "{}: connection refused",
                store_name
            )));
        }

        let client = StubClient::new(store_name);
        for fragment in self.fail_sql.lock().iter() {
            client.fail_on(fragment.clone());
        }
        if self.fail_close.lock().contains(store_name) {
            client.fail_close();
        }
        self.clients
            .lock()
            .entry(store_name.to_string())
            .or_default()
            .push(client.clone());

        Ok(ConnectionHandle::new(store_name, client, self.pool.clone(), TlsMode::Disabled).initialized())
    }
}
