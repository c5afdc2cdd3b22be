//! Distributed mutual exclusion over PostgreSQL advisory locks.
//!
//! Serializes access to a named resource across processes and hosts that
//! share one database, without a dedicated lock service. A lock name is
//! hashed to a signed 32-bit key under a fixed namespace, acquired through
//! a bounded fixed-interval retry loop, and held either for the session
//! (explicitly released) or for the enclosing transaction (released by the
//! database at commit or rollback). Guarded execution runs a critical
//! section under a TTL deadline and releases the lock on every exit path.
//!
//! The database connection is reached through the [`LockDriver`] trait;
//! `pg-lock-postgres` implements it for `tokio_postgres` handles.

#![deny(clippy::all)]

mod driver;
mod error;
mod event;
mod key;
mod locket;
mod mock;
mod session;

pub use driver::DriverError;
pub use driver::LockDriver;
pub use error::PgLockError;
pub use event::LockEvent;
pub use event::LogCallback;
pub use key::lock_key;
pub use key::LOCK_NAMESPACE;
pub use locket::LockMode;
pub use locket::Locket;
pub use mock::MockDriver;
pub use mock::MockDriverBuilder;
pub use mock::SharedLockTable;
pub use session::LockOutcome;
pub use session::PgLock;
pub use session::PgLockConfig;
