//! Storage contracts consumed by the ledger coordinator.
//!
//! Every call that reads or changes ledger state takes the transaction
//! handle produced by [`UnitOfWork::begin`], so account locks, balance
//! changes and log entries all share one atomic scope.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::errors::StoreResult;
use crate::models::{Account, NewTransactionRecord, TransactionRecord};

/// Transaction boundary of a store.
///
/// Dropping a `Tx` without passing it to [`UnitOfWork::commit`] must
/// discard every change made through it, the same as a rollback.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    type Tx: Send;

    async fn begin(&self) -> StoreResult<Self::Tx>;

    async fn commit(&self, tx: Self::Tx) -> StoreResult<()>;

    async fn rollback(&self, tx: Self::Tx) -> StoreResult<()>;
}

#[async_trait]
pub trait AccountStore: UnitOfWork {
    /// Reads the account and holds an exclusive lock on it until `tx` ends.
    /// Blocks while another transaction holds the lock.
    async fn lock_and_get(&self, tx: &mut Self::Tx, account_id: i64) -> StoreResult<Option<Account>>;

    /// Adds `delta` to the stored balance in place and returns the balance
    /// now held by the row.
    async fn apply_delta(&self, tx: &mut Self::Tx, account_id: i64, delta: Decimal) -> StoreResult<Decimal>;
}

#[async_trait]
pub trait TransactionLogStore: UnitOfWork {
    /// Appends a record; the store assigns id and timestamp.
    async fn append(&self, tx: &mut Self::Tx, record: NewTransactionRecord) -> StoreResult<TransactionRecord>;
}

/// A store able to serve both halves of a ledger operation.
pub trait LedgerStore: AccountStore + TransactionLogStore {}

impl<T> LedgerStore for T where T: AccountStore + TransactionLogStore {}
