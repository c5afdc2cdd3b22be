//! A mock [`LockDriver`] for testing lock orchestration without a database.
//!
//! The mock emulates advisory-lock semantics against an in-memory table of
//! held `(namespace, key)` pairs. Two mocks built over the same shared
//! table behave like two connections to the same database: at most one can
//! hold a given pair at a time. Call counters allow asserting on retry
//! behavior, and failure injection covers the database-error paths.
//!
//! # Example
//!
//! ```
//! use pg_lock::MockDriver;
//!
//! let table = MockDriver::shared_table();
//! let conn_a = MockDriver::builder().table(table.clone()).build();
//! let conn_b = MockDriver::builder().table(table).build();
//! // conn_a and conn_b now contend for the same locks.
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::driver::{DriverError, LockDriver};

/// The set of currently held `(namespace, key)` pairs, shared between mock
/// connections to the same imaginary database.
pub type SharedLockTable = Arc<Mutex<HashSet<(i32, i32)>>>;

pub struct MockDriver {
    table: SharedLockTable,
    in_transaction: bool,
    deny_all: bool,
    acquire_error: Option<String>,
    release_error: Option<String>,
    session_attempts: AtomicU32,
    transaction_attempts: AtomicU32,
    releases: AtomicU32,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// A mock connection to its own private lock table.
    pub fn new() -> Self {
        MockDriverBuilder::default().build()
    }

    pub fn builder() -> MockDriverBuilder {
        MockDriverBuilder::default()
    }

    /// A fresh lock table to share between mock connections.
    pub fn shared_table() -> SharedLockTable {
        Arc::new(Mutex::new(HashSet::new()))
    }

    /// Number of session-scoped acquire calls issued so far.
    pub fn session_attempts(&self) -> u32 {
        self.session_attempts.load(Ordering::SeqCst)
    }

    /// Number of transaction-scoped acquire calls issued so far.
    pub fn transaction_attempts(&self) -> u32 {
        self.transaction_attempts.load(Ordering::SeqCst)
    }

    /// Number of release calls issued so far.
    pub fn releases(&self) -> u32 {
        self.releases.load(Ordering::SeqCst)
    }

    /// Whether the table currently records `(namespace, key)` as held.
    pub fn holds(&self, namespace: i32, key: i32) -> bool {
        self.table.lock().unwrap().contains(&(namespace, key))
    }
}

#[async_trait]
impl LockDriver for MockDriver {
    async fn try_session_lock(&self, namespace: i32, key: i32) -> Result<bool, DriverError> {
        self.session_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = &self.acquire_error {
            return Err(DriverError::message(msg.clone()));
        }
        if self.deny_all {
            return Ok(false);
        }
        // Deviation from pg_try_advisory_lock: the real primitive is
        // re-entrant per session (the lock count increments), while the
        // table denies any re-acquisition of a held pair, including by
        // the holder itself.
        Ok(self.table.lock().unwrap().insert((namespace, key)))
    }

    async fn release_session_lock(&self, namespace: i32, key: i32) -> Result<bool, DriverError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = &self.release_error {
            return Err(DriverError::message(msg.clone()));
        }
        Ok(self.table.lock().unwrap().remove(&(namespace, key)))
    }

    async fn try_transaction_lock(&self, namespace: i32, key: i32) -> Result<bool, DriverError> {
        self.transaction_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = &self.acquire_error {
            return Err(DriverError::message(msg.clone()));
        }
        if self.deny_all {
            return Ok(false);
        }
        // Transaction holds are dropped when the imaginary transaction
        // ends; the mock has no transaction boundary, so they are simply
        // recorded as held for the rest of the test.
        Ok(self.table.lock().unwrap().insert((namespace, key)))
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}

#[derive(Default)]
pub struct MockDriverBuilder {
    table: Option<SharedLockTable>,
    in_transaction: bool,
    deny_all: bool,
    acquire_error: Option<String>,
    release_error: Option<String>,
}

impl MockDriverBuilder {
    /// Back this connection with an existing shared table.
    pub fn table(mut self, table: SharedLockTable) -> Self {
        self.table = Some(table);
        self
    }

    /// Report an open transaction to the session under test.
    pub fn in_transaction(mut self) -> Self {
        self.in_transaction = true;
        self
    }

    /// Fail every acquire attempt with `Ok(false)`, as if the lock were
    /// always held elsewhere.
    pub fn deny_all(mut self) -> Self {
        self.deny_all = true;
        self
    }

    /// Make every acquire call return a database error.
    pub fn fail_acquire(mut self, msg: impl Into<String>) -> Self {
        self.acquire_error = Some(msg.into());
        self
    }

    /// Make every release call return a database error.
    pub fn fail_release(mut self, msg: impl Into<String>) -> Self {
        self.release_error = Some(msg.into());
        self
    }

    pub fn build(self) -> MockDriver {
        MockDriver {
            table: self.table.unwrap_or_else(MockDriver::shared_table),
            in_transaction: self.in_transaction,
            deny_all: self.deny_all,
            acquire_error: self.acquire_error,
            release_error: self.release_error,
            session_attempts: AtomicU32::new(0),
            transaction_attempts: AtomicU32::new(0),
            releases: AtomicU32::new(0),
        }
    }
}
