//! Events delivered to the injected logging callback.

use std::sync::Arc;

/// Callback receiving lifecycle events from a [`PgLock`](crate::PgLock).
///
/// Callbacks are infallible by contract: a callback must not panic. The
/// release path reports its own failures through the callback, so a
/// panicking callback would abort cleanup reporting.
pub type LogCallback = Arc<dyn Fn(&LockEvent) + Send + Sync>;

/// A lock lifecycle event.
///
/// `attempt` is the zero-based index of the acquisition attempt that
/// succeeded; `namespace`/`key` are the advisory-lock integer pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockEvent {
    /// A session-scoped lock was acquired.
    Create {
        attempt: u32,
        namespace: i32,
        key: i32,
    },
    /// A transaction-scoped lock was acquired.
    CreateTransactionLock {
        attempt: u32,
        namespace: i32,
        key: i32,
    },
    /// A session-scoped lock was released.
    Delete { namespace: i32, key: i32 },
    /// Releasing failed; the error was reported here instead of propagating.
    Exception { message: String },
}
