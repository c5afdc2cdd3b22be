//! Lock lifecycle orchestration: bounded-retry acquisition, TTL-bounded
//! critical sections, and guaranteed release.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::driver::LockDriver;
use crate::error::PgLockError;
use crate::event::{LockEvent, LogCallback};
use crate::key::{lock_key, LOCK_NAMESPACE};
use crate::locket::Locket;

/// Configuration for one [`PgLock`].
///
/// `attempts` below 1 is clamped to 1: a session always tries at least
/// once. A `ttl` of `None` (or zero) disables the critical-section
/// deadline; the acquisition loop itself is never time-limited by it.
#[derive(Clone)]
pub struct PgLockConfig {
    /// Identity of the resource being serialized. Hashed to the advisory
    /// lock key, so any two sessions with the same name contend.
    pub name: String,
    /// Maximum acquisition attempts per lifecycle (default 3).
    pub attempts: u32,
    /// Fixed delay between failed attempts (default 1s). Deliberately not
    /// exponential: typical holders run short local critical sections.
    pub attempt_interval: Duration,
    /// Deadline for the critical section once the lock is held
    /// (default 60s).
    pub ttl: Option<Duration>,
    /// When true (default), guarded execution surfaces the critical
    /// section's own return value; when false, only a success indicator.
    pub return_result: bool,
    /// Optional callback receiving [`LockEvent`]s.
    pub log: Option<LogCallback>,
}

impl Default for PgLockConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            attempts: 3,
            attempt_interval: Duration::from_secs(1),
            ttl: Some(Duration::from_secs(60)),
            return_result: true,
            log: None,
        }
    }
}

impl PgLockConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Outcome of a guarded execution.
///
/// Distinguishes "the critical section ran" from "the lock was never
/// acquired", independently of whatever the section returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome<T> {
    /// The lock was held and the critical section completed. Carries the
    /// section's value when `return_result` is enabled.
    Acquired(Option<T>),
    /// Every acquisition attempt failed; the section never ran.
    NotAcquired,
}

impl<T> LockOutcome<T> {
    pub fn is_acquired(&self) -> bool {
        matches!(self, LockOutcome::Acquired(_))
    }

    /// The critical section's value, when there is one.
    pub fn into_value(self) -> Option<T> {
        match self {
            LockOutcome::Acquired(value) => value,
            LockOutcome::NotAcquired => None,
        }
    }
}

/// One logical lock lifecycle over a borrowed connection.
///
/// A session owns exactly one [`Locket`] bound to
/// `(LOCK_NAMESPACE, lock_key(name))`. The entry points take `&mut self`,
/// so a session cannot be driven concurrently; independent sessions with
/// the same name contend through the database.
///
/// # Example
///
/// ```ignore
/// let mut session = PgLock::new(&client, "nightly-billing");
/// match session.lock(|| async { run_billing().await }).await? {
///     LockOutcome::Acquired(result) => println!("ran: {result:?}"),
///     LockOutcome::NotAcquired => println!("another host is on it"),
/// }
/// ```
pub struct PgLock<'c, D: LockDriver + ?Sized> {
    name: String,
    max_attempts: u32,
    attempt_interval: Duration,
    ttl: Option<Duration>,
    return_result: bool,
    log: Option<LogCallback>,
    locket: Locket<'c, D>,
}

impl<'c, D: LockDriver + ?Sized> PgLock<'c, D> {
    /// A session with default configuration for `name`.
    pub fn new(conn: &'c D, name: impl Into<String>) -> Self {
        Self::with_config(conn, PgLockConfig::new(name))
    }

    pub fn with_config(conn: &'c D, config: PgLockConfig) -> Self {
        let key = lock_key(&config.name);
        Self {
            name: config.name,
            max_attempts: config.attempts.max(1),
            attempt_interval: config.attempt_interval,
            ttl: config.ttl,
            return_result: config.return_result,
            log: config.log,
            locket: Locket::new(conn, LOCK_NAMESPACE, key),
        }
    }

    /// Drives the bounded-retry loop for a session-scoped lock.
    ///
    /// Returns `Ok(true)` once an attempt succeeds, `Ok(false)` after the
    /// last attempt fails. Sleeps `attempt_interval` between failed
    /// attempts, never after the last. Database errors abort the loop.
    pub async fn create(&mut self) -> Result<bool, PgLockError> {
        let (namespace, key) = self.locket.args();
        for attempt in 0..self.max_attempts {
            if self.locket.lock().await? {
                debug!(
                    name = %self.name,
                    namespace,
                    key,
                    attempt,
                    "acquired session advisory lock"
                );
                self.emit(LockEvent::Create {
                    attempt,
                    namespace,
                    key,
                });
                return Ok(true);
            }
            if attempt + 1 < self.max_attempts {
                sleep(self.attempt_interval).await;
            }
        }
        debug!(
            name = %self.name,
            attempts = self.max_attempts,
            "exhausted session advisory lock attempts"
        );
        Ok(false)
    }

    /// Same loop shape as [`create`](PgLock::create) over the
    /// transaction-scoped primitive. Reports `Ok(false)` immediately on a
    /// connection with no open transaction.
    pub async fn create_transaction_lock(&mut self) -> Result<bool, PgLockError> {
        let (namespace, key) = self.locket.args();
        for attempt in 0..self.max_attempts {
            if self.locket.lock_for_transaction().await? {
                debug!(
                    name = %self.name,
                    namespace,
                    key,
                    attempt,
                    "acquired transaction advisory lock"
                );
                self.emit(LockEvent::CreateTransactionLock {
                    attempt,
                    namespace,
                    key,
                });
                return Ok(true);
            }
            if attempt + 1 < self.max_attempts {
                sleep(self.attempt_interval).await;
            }
        }
        debug!(
            name = %self.name,
            attempts = self.max_attempts,
            "exhausted transaction advisory lock attempts"
        );
        Ok(false)
    }

    /// Releases the session's hold, if any.
    ///
    /// A failing release is reported through the logging callback as an
    /// [`LockEvent::Exception`] and swallowed when a callback is
    /// configured; without one it propagates.
    pub async fn delete(&mut self) -> Result<(), PgLockError> {
        let (namespace, key) = self.locket.args();
        match self.locket.unlock().await {
            Ok(_) => {
                debug!(name = %self.name, namespace, key, "released advisory lock");
                self.emit(LockEvent::Delete { namespace, key });
                Ok(())
            }
            Err(err) => {
                warn!(
                    name = %self.name,
                    namespace,
                    key,
                    error = %err,
                    "failed to release advisory lock"
                );
                match &self.log {
                    Some(log) => {
                        log(&LockEvent::Exception {
                            message: err.to_string(),
                        });
                        Ok(())
                    }
                    None => Err(err),
                }
            }
        }
    }

    /// Runs `section` under the lock if it can be acquired.
    ///
    /// Exhaustion is a value ([`LockOutcome::NotAcquired`]); the section is
    /// executed under the TTL deadline; and the lock is released on every
    /// exit path on which this session still holds it, including deadline
    /// expiry and database errors, before any error propagates.
    pub async fn lock<F, Fut, T>(&mut self, section: F) -> Result<LockOutcome<T>, PgLockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if !self.create().await? {
            return Ok(LockOutcome::NotAcquired);
        }
        let outcome = self.run_section(section).await;
        let cleanup = if self.locket.active() {
            self.delete().await
        } else {
            Ok(())
        };
        cleanup?;
        let value = outcome?;
        Ok(LockOutcome::Acquired(
            self.return_result.then_some(value),
        ))
    }

    /// Like [`lock`](PgLock::lock), but exhaustion is an error.
    ///
    /// Returns the section's value (`None` when `return_result` is
    /// disabled), or [`PgLockError::UnableToLock`] carrying the lock name
    /// and attempt count when every attempt failed.
    pub async fn lock_required<F, Fut, T>(&mut self, section: F) -> Result<Option<T>, PgLockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        match self.lock(section).await? {
            LockOutcome::Acquired(value) => Ok(value),
            LockOutcome::NotAcquired => Err(PgLockError::UnableToLock {
                name: self.name.clone(),
                attempts: self.max_attempts,
            }),
        }
    }

    /// Acquires a transaction-scoped lock, retrying like
    /// [`lock`](PgLock::lock) but performing no explicit release: the lock
    /// lives until the caller's transaction commits or rolls back.
    pub async fn lock_for_transaction(&mut self) -> Result<bool, PgLockError> {
        self.create_transaction_lock().await
    }

    /// Like [`lock_for_transaction`](PgLock::lock_for_transaction), but
    /// exhaustion is an error.
    pub async fn lock_for_transaction_required(&mut self) -> Result<(), PgLockError> {
        if self.create_transaction_lock().await? {
            Ok(())
        } else {
            Err(PgLockError::UnableToLock {
                name: self.name.clone(),
                attempts: self.max_attempts,
            })
        }
    }

    /// Whether this session currently believes it holds the lock. Locally
    /// tracked; false before first acquisition and after any release.
    pub fn acquired(&self) -> bool {
        self.locket.active()
    }

    async fn run_section<F, Fut, T>(&self, section: F) -> Result<T, PgLockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        match self.ttl {
            Some(ttl) if !ttl.is_zero() => match timeout(ttl, section()).await {
                Ok(value) => Ok(value),
                Err(_) => Err(PgLockError::SectionTimeout {
                    name: self.name.clone(),
                    ttl,
                }),
            },
            _ => Ok(section().await),
        }
    }

    fn emit(&self, event: LockEvent) {
        if let Some(log) = &self.log {
            log(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDriver;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn config(name: &str) -> PgLockConfig {
        PgLockConfig {
            attempt_interval: Duration::from_millis(100),
            ..PgLockConfig::new(name)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn create_succeeds_on_first_attempt() {
        let conn = MockDriver::new();
        let mut session = PgLock::with_config(&conn, config("first-try"));

        assert!(session.create().await.unwrap());
        assert!(session.acquired());
        assert_eq!(conn.session_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn create_retries_with_fixed_interval() {
        let conn = MockDriver::builder().deny_all().build();
        let mut session = PgLock::with_config(
            &conn,
            PgLockConfig {
                attempts: 4,
                ..config("contended")
            },
        );

        let start = Instant::now();
        assert!(!session.create().await.unwrap());

        assert_eq!(conn.session_attempts(), 4);
        // Three pauses between four attempts, none after the last.
        assert_eq!(start.elapsed(), Duration::from_millis(300));
        assert!(!session.acquired());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_still_tries_once() {
        let conn = MockDriver::builder().deny_all().build();
        let mut session = PgLock::with_config(
            &conn,
            PgLockConfig {
                attempts: 0,
                ..config("clamped")
            },
        );

        assert!(!session.create().await.unwrap());
        assert_eq!(conn.session_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lock_returns_section_value() {
        let conn = MockDriver::new();
        let mut session = PgLock::with_config(&conn, config("value"));

        let outcome = session.lock(|| async { "result" }).await.unwrap();
        assert_eq!(outcome, LockOutcome::Acquired(Some("result")));
    }

    #[tokio::test(start_paused = true)]
    async fn return_result_disabled_suppresses_value() {
        let conn = MockDriver::new();
        let mut session = PgLock::with_config(
            &conn,
            PgLockConfig {
                return_result: false,
                ..config("suppressed")
            },
        );

        let outcome = session.lock(|| async { "result" }).await.unwrap();
        assert_eq!(outcome, LockOutcome::Acquired(None));
        assert!(outcome.is_acquired());
    }

    #[tokio::test(start_paused = true)]
    async fn lock_releases_after_section_completes() {
        let conn = MockDriver::new();
        let mut session = PgLock::with_config(&conn, config("released"));

        let outcome = session.lock(|| async { 42 }).await.unwrap();
        assert!(outcome.is_acquired());
        assert!(!session.acquired());
        assert_eq!(conn.releases(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_lock_reports_not_acquired() {
        let conn = MockDriver::builder().deny_all().build();
        let mut session = PgLock::with_config(&conn, config("exhausted"));

        let outcome = session.lock(|| async { 42 }).await.unwrap();
        assert_eq!(outcome, LockOutcome::NotAcquired);
        assert_eq!(outcome.into_value(), None);
        // The critical section never ran, so there is nothing to release.
        assert_eq!(conn.releases(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn lock_required_raises_on_exhaustion() {
        let conn = MockDriver::builder().deny_all().build();
        let mut session = PgLock::with_config(
            &conn,
            PgLockConfig {
                attempts: 5,
                ..config("strict")
            },
        );

        let err = session.lock_required(|| async {}).await.unwrap_err();
        match err {
            PgLockError::UnableToLock { name, attempts } => {
                assert_eq!(name, "strict");
                assert_eq!(attempts, 5);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_interrupts_long_section_and_releases() {
        let conn = MockDriver::new();
        let mut session = PgLock::with_config(
            &conn,
            PgLockConfig {
                ttl: Some(Duration::from_secs(2)),
                ..config("deadline")
            },
        );

        let err = session
            .lock(|| async {
                sleep(Duration::from_secs(3)).await;
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PgLockError::SectionTimeout { .. }));
        // Released before the timeout propagated.
        assert!(!session.acquired());
        assert_eq!(conn.releases(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ttl_disables_the_deadline() {
        let conn = MockDriver::new();
        let mut session = PgLock::with_config(
            &conn,
            PgLockConfig {
                ttl: Some(Duration::ZERO),
                ..config("no-deadline")
            },
        );

        let outcome = session
            .lock(|| async {
                sleep(Duration::from_secs(3600)).await;
                "finished"
            })
            .await
            .unwrap();
        assert_eq!(outcome, LockOutcome::Acquired(Some("finished")));
    }

    #[tokio::test(start_paused = true)]
    async fn log_callback_sees_create_and_delete() {
        let events: Arc<Mutex<Vec<LockEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let conn = MockDriver::new();
        let mut session = PgLock::with_config(
            &conn,
            PgLockConfig {
                log: Some(Arc::new(move |event: &LockEvent| {
                    sink.lock().unwrap().push(event.clone());
                })),
                ..config("logged")
            },
        );

        session.lock(|| async {}).await.unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], LockEvent::Create { attempt: 0, .. }));
        assert!(matches!(events[1], LockEvent::Delete { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn release_failure_is_reported_through_callback() {
        let events: Arc<Mutex<Vec<LockEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let conn = MockDriver::builder().fail_release("connection reset").build();
        let mut session = PgLock::with_config(
            &conn,
            PgLockConfig {
                log: Some(Arc::new(move |event: &LockEvent| {
                    sink.lock().unwrap().push(event.clone());
                })),
                ..config("reported")
            },
        );

        // Swallowed because a callback is configured.
        session.lock(|| async {}).await.unwrap();

        let events = events.lock().unwrap();
        assert!(matches!(events[0], LockEvent::Create { .. }));
        assert!(
            matches!(&events[1], LockEvent::Exception { message } if message.contains("connection reset"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn release_failure_propagates_without_callback() {
        let conn = MockDriver::builder().fail_release("connection reset").build();
        let mut session = PgLock::with_config(&conn, config("unreported"));

        let err = session.lock(|| async {}).await.unwrap_err();
        assert!(matches!(err, PgLockError::Driver(_)));
        assert!(!session.acquired());
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_errors_propagate() {
        let conn = MockDriver::builder().fail_acquire("connection reset").build();
        let mut session = PgLock::with_config(&conn, config("broken"));

        assert!(matches!(
            session.lock(|| async {}).await,
            Err(PgLockError::Driver(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn transaction_lock_outside_transaction_is_not_acquired() {
        let conn = MockDriver::new();
        let mut session = PgLock::with_config(&conn, config("no-txn"));

        assert!(!session.lock_for_transaction().await.unwrap());
        assert!(!session.acquired());
    }

    #[tokio::test(start_paused = true)]
    async fn transaction_lock_inside_transaction_succeeds() {
        let conn = MockDriver::builder().in_transaction().build();
        let mut session = PgLock::with_config(&conn, config("txn"));

        assert!(session.lock_for_transaction().await.unwrap());
        assert!(session.acquired());
        // No explicit release for transaction-scoped holds.
        assert_eq!(conn.releases(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transaction_lock_required_raises_on_exhaustion() {
        let conn = MockDriver::builder().in_transaction().deny_all().build();
        let mut session = PgLock::with_config(&conn, config("txn-strict"));

        let err = session.lock_for_transaction_required().await.unwrap_err();
        assert!(matches!(err, PgLockError::UnableToLock { .. }));
        assert_eq!(conn.transaction_attempts(), 3);
    }
}
