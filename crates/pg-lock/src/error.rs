use std::time::Duration;

use thiserror::Error;

use crate::driver::DriverError;

#[derive(Error, Debug)]
pub enum PgLockError {
    /// Every acquisition attempt failed. Raised only by the `_required`
    /// entry points; the plain entry points report exhaustion as
    /// [`LockOutcome::NotAcquired`](crate::LockOutcome::NotAcquired).
    #[error("unable to acquire lock {name:?} after {attempts} attempts")]
    UnableToLock { name: String, attempts: u32 },

    /// The critical section outlived its TTL. The lock has already been
    /// released by the time this propagates.
    #[error("critical section for lock {name:?} exceeded its ttl of {ttl:?}")]
    SectionTimeout { name: String, ttl: Duration },

    /// Database-layer failure during an acquire or release call.
    #[error(transparent)]
    Driver(#[from] DriverError),
}
