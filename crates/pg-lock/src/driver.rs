//! The connection collaborator boundary.
//!
//! `pg-lock` never speaks the database wire protocol itself. It drives a
//! borrowed connection through the three advisory-lock primitives below,
//! implemented for a concrete backend in a driver crate (see
//! `pg-lock-postgres`) or by [`MockDriver`](crate::MockDriver) in tests.

use std::error::Error;
use std::fmt;

use async_trait::async_trait;

/// Advisory-lock primitives exposed by a live database connection.
///
/// All acquire primitives are non-blocking: `Ok(false)` means the lock is
/// held elsewhere and is a normal outcome, not an error. `Err` is reserved
/// for database-layer failures and is always propagated to the caller.
#[async_trait]
pub trait LockDriver: Send + Sync {
    /// Try to take the session-scoped advisory lock `(namespace, key)`.
    ///
    /// A session lock is held until [`release_session_lock`] is called or
    /// the connection closes.
    ///
    /// [`release_session_lock`]: LockDriver::release_session_lock
    async fn try_session_lock(&self, namespace: i32, key: i32) -> Result<bool, DriverError>;

    /// Release a previously taken session-scoped advisory lock.
    ///
    /// Returns `Ok(false)` when the database reports the lock was not held
    /// by this session.
    async fn release_session_lock(&self, namespace: i32, key: i32) -> Result<bool, DriverError>;

    /// Try to take the transaction-scoped advisory lock `(namespace, key)`.
    ///
    /// The lock is relinquished automatically when the enclosing
    /// transaction commits or rolls back; there is no explicit release.
    async fn try_transaction_lock(&self, namespace: i32, key: i32) -> Result<bool, DriverError>;

    /// Whether this handle is currently inside an open transaction.
    ///
    /// Outside a transaction the transactional primitive would acquire and
    /// instantly release, so callers consult this before issuing it.
    fn in_transaction(&self) -> bool;
}

/// A database-layer failure reported by a [`LockDriver`].
///
/// Backend-agnostic wrapper so the core crate does not depend on any one
/// database client's error type.
#[derive(Debug)]
pub struct DriverError(Box<dyn Error + Send + Sync>);

impl DriverError {
    pub fn new(source: impl Error + Send + Sync + 'static) -> Self {
        Self(Box::new(source))
    }

    /// Wraps a plain message, for drivers without a structured error type.
    pub fn message(msg: impl Into<String>) -> Self {
        Self(msg.into().into())
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Error for DriverError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.source()
    }
}
