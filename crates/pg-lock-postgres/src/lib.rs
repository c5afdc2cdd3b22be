//! [`LockDriver`] implementations for `tokio_postgres` handles.
//!
//! Two borrowing wrappers are provided:
//!
//! - [`ClientDriver`] over a [`tokio_postgres::Client`] — autocommit.
//!   `in_transaction` is false: explicit transactions in `tokio_postgres`
//!   go through [`Client::transaction`](tokio_postgres::Client::transaction),
//!   which borrows the client mutably, so a usable `Client` is by
//!   construction outside any transaction.
//! - [`TransactionDriver`] over a [`tokio_postgres::Transaction`] —
//!   `in_transaction` is true, and transaction-scoped locks taken on it
//!   are released by the database when the transaction commits or rolls
//!   back.
//!
//! ```ignore
//! let (client, connection) = tokio_postgres::connect(url, NoTls).await?;
//! tokio::spawn(connection);
//!
//! let driver = ClientDriver::new(&client);
//! let mut session = PgLock::new(&driver, "nightly-billing");
//! session.lock(|| async { /* critical section */ }).await?;
//! ```

#![deny(clippy::all)]

use async_trait::async_trait;
use pg_lock::{DriverError, LockDriver};
use tokio_postgres::{Client, GenericClient, Transaction};

const TRY_SESSION_LOCK: &str = "SELECT pg_try_advisory_lock($1, $2)";
const RELEASE_SESSION_LOCK: &str = "SELECT pg_advisory_unlock($1, $2)";
const TRY_TRANSACTION_LOCK: &str = "SELECT pg_try_advisory_xact_lock($1, $2)";

/// Runs one of the advisory-lock functions and reads its boolean result.
async fn query_flag<C>(conn: &C, sql: &str, namespace: i32, key: i32) -> Result<bool, DriverError>
where
    C: GenericClient + Sync,
{
    let row = conn
        .query_one(sql, &[&namespace, &key])
        .await
        .map_err(DriverError::new)?;
    Ok(row.get(0))
}

/// [`LockDriver`] over an autocommit client.
pub struct ClientDriver<'a> {
    client: &'a Client,
}

impl<'a> ClientDriver<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LockDriver for ClientDriver<'_> {
    async fn try_session_lock(&self, namespace: i32, key: i32) -> Result<bool, DriverError> {
        query_flag(self.client, TRY_SESSION_LOCK, namespace, key).await
    }

    async fn release_session_lock(&self, namespace: i32, key: i32) -> Result<bool, DriverError> {
        query_flag(self.client, RELEASE_SESSION_LOCK, namespace, key).await
    }

    async fn try_transaction_lock(&self, namespace: i32, key: i32) -> Result<bool, DriverError> {
        query_flag(self.client, TRY_TRANSACTION_LOCK, namespace, key).await
    }

    fn in_transaction(&self) -> bool {
        false
    }
}

/// [`LockDriver`] over an open transaction. The caller keeps the
/// transaction handle and remains responsible for committing or rolling
/// back, which is also what releases any transaction-scoped lock.
pub struct TransactionDriver<'a, 't> {
    transaction: &'a Transaction<'t>,
}

impl<'a, 't> TransactionDriver<'a, 't> {
    pub fn new(transaction: &'a Transaction<'t>) -> Self {
        Self { transaction }
    }
}

#[async_trait]
impl LockDriver for TransactionDriver<'_, '_> {
    async fn try_session_lock(&self, namespace: i32, key: i32) -> Result<bool, DriverError> {
        query_flag(self.transaction, TRY_SESSION_LOCK, namespace, key).await
    }

    async fn release_session_lock(&self, namespace: i32, key: i32) -> Result<bool, DriverError> {
        query_flag(self.transaction, RELEASE_SESSION_LOCK, namespace, key).await
    }

    async fn try_transaction_lock(&self, namespace: i32, key: i32) -> Result<bool, DriverError> {
        query_flag(self.transaction, TRY_TRANSACTION_LOCK, namespace, key).await
    }

    fn in_transaction(&self) -> bool {
        true
    }
}
