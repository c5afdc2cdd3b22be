//! One advisory-lock handle: a `(namespace, key)` pair bound to a borrowed
//! connection, with locally tracked hold state.

use tracing::debug;

use crate::driver::LockDriver;
use crate::error::PgLockError;

/// Scope of a hold: session locks need an explicit release, transaction
/// locks are relinquished by the surrounding transaction boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Session,
    Transaction,
}

/// A single advisory lock identified by `(namespace, key)` on one borrowed
/// connection.
///
/// `active()` reflects this handle's view only: true between a successful
/// acquire and the next [`unlock`](Locket::unlock), never a live database
/// query. The database enforces the actual mutual exclusion.
pub struct Locket<'c, D: LockDriver + ?Sized> {
    conn: &'c D,
    namespace: i32,
    key: i32,
    acquired: bool,
    mode: Option<LockMode>,
}

impl<'c, D: LockDriver + ?Sized> Locket<'c, D> {
    pub fn new(conn: &'c D, namespace: i32, key: i32) -> Self {
        Self {
            conn,
            namespace,
            key,
            acquired: false,
            mode: None,
        }
    }

    /// Non-blocking session-scoped acquire. `Ok(false)` is a normal
    /// outcome and leaves the handle unchanged; safe to call again.
    pub async fn lock(&mut self) -> Result<bool, PgLockError> {
        let locked = self.conn.try_session_lock(self.namespace, self.key).await?;
        if locked {
            self.acquired = true;
            self.mode = Some(LockMode::Session);
        }
        Ok(locked)
    }

    /// Non-blocking transaction-scoped acquire.
    ///
    /// Reports `Ok(false)` without touching the database when no
    /// transaction is open: outside a transaction the underlying primitive
    /// would acquire and instantly release, which is indistinguishable
    /// from never holding the lock.
    pub async fn lock_for_transaction(&mut self) -> Result<bool, PgLockError> {
        if !self.conn.in_transaction() {
            debug!(
                namespace = self.namespace,
                key = self.key,
                "transaction lock requested outside a transaction"
            );
            return Ok(false);
        }
        let locked = self
            .conn
            .try_transaction_lock(self.namespace, self.key)
            .await?;
        if locked {
            self.acquired = true;
            self.mode = Some(LockMode::Transaction);
        }
        Ok(locked)
    }

    /// Releases a session-mode hold.
    ///
    /// Clears the tracked state unconditionally before issuing the release
    /// call, so this handle never reports a hold it has tried to give up.
    /// Transaction-mode holds issue no release; the transaction boundary
    /// owns them. Database errors propagate.
    pub async fn unlock(&mut self) -> Result<bool, PgLockError> {
        let mode = self.mode.take();
        self.acquired = false;
        match mode {
            Some(LockMode::Session) => {
                let released = self
                    .conn
                    .release_session_lock(self.namespace, self.key)
                    .await?;
                Ok(released)
            }
            Some(LockMode::Transaction) | None => Ok(false),
        }
    }

    /// Locally tracked hold state; no I/O.
    pub fn active(&self) -> bool {
        self.acquired
    }

    /// The advisory-lock integer pair this handle is bound to.
    pub fn args(&self) -> (i32, i32) {
        (self.namespace, self.key)
    }
}
