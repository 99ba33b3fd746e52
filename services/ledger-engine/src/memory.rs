//! In-memory ledger store.
//!
//! Each account sits behind its own async mutex. A transaction handle owns
//! the guards of the accounts it locked together with staged copies of
//! their rows and the log entries it appended; commit publishes both while
//! the guards are still held, rollback or drop throws them away.

use crate::errors::{StoreError, StoreResult};
use crate::models::{Account, NewTransactionRecord, TransactionRecord};
use crate::store::{AccountStore, TransactionLogStore, UnitOfWork};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

type AccountCell = Arc<AsyncMutex<Account>>;

#[derive(Default)]
struct FaultPlan {
    delta: AtomicBool,
    append: AtomicBool,
    commit: AtomicBool,
}

impl FaultPlan {
    fn take(flag: &AtomicBool) -> bool {
        flag.swap(false, Ordering::SeqCst)
    }
}

pub struct InMemoryLedgerStore {
    accounts: RwLock<HashMap<i64, AccountCell>>,
    log: Mutex<Vec<TransactionRecord>>,
    next_account_id: AtomicI64,
    next_record_id: AtomicI64,
    lock_timeout: Option<Duration>,
    faults: FaultPlan,
}

struct LockedAccount {
    guard: OwnedMutexGuard<Account>,
    staged: Account,
}

/// Transaction handle of [`InMemoryLedgerStore`]
pub struct MemoryTx {
    locked: HashMap<i64, LockedAccount>,
    pending: Vec<TransactionRecord>,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        InMemoryLedgerStore {
            accounts: RwLock::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            next_account_id: AtomicI64::new(1),
            next_record_id: AtomicI64::new(1),
            lock_timeout: None,
            faults: FaultPlan::default(),
        }
    }

    /// Bound how long `lock_and_get` waits for a held account.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Provision an account with an opening balance.
    pub fn seed_account(&self, display_name: &str, balance: Decimal) -> Account {
        let account = Account {
            id: self.next_account_id.fetch_add(1, Ordering::SeqCst),
            display_name: display_name.to_string(),
            balance,
            created_at: Utc::now(),
        };

        self.accounts
            .write()
            .insert(account.id, Arc::new(AsyncMutex::new(account.clone())));

        account
    }

    /// Committed balance. Waits for any transaction holding the account.
    pub async fn balance(&self, account_id: i64) -> Option<Decimal> {
        let cell = self.cell(account_id)?;
        let account = cell.lock().await;
        Some(account.balance)
    }

    /// Committed log entries of one account, oldest first
    pub fn records_for(&self, account_id: i64) -> Vec<TransactionRecord> {
        self.log
            .lock()
            .iter()
            .filter(|r| r.account_id == account_id)
            .cloned()
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.log.lock().len()
    }

    /// Make the next `apply_delta` fail.
    pub fn fail_next_delta(&self) {
        self.faults.delta.store(true, Ordering::SeqCst);
    }

    /// Make the next `append` fail.
    pub fn fail_next_append(&self) {
        self.faults.append.store(true, Ordering::SeqCst);
    }

    /// Make the next `commit` fail and discard the transaction.
    pub fn fail_next_commit(&self) {
        self.faults.commit.store(true, Ordering::SeqCst);
    }

    fn cell(&self, account_id: i64) -> Option<AccountCell> {
        self.accounts.read().get(&account_id).cloned()
    }

    async fn acquire(&self, tx: &mut MemoryTx, account_id: i64) -> StoreResult<Option<Account>> {
        if let Some(locked) = tx.locked.get(&account_id) {
            return Ok(Some(locked.staged.clone()));
        }

        let Some(cell) = self.cell(account_id) else {
            return Ok(None);
        };

        let guard = match self.lock_timeout {
            Some(timeout) => tokio::time::timeout(timeout, cell.lock_owned())
                .await
                .map_err(|_| StoreError::LockTimeout(account_id))?,
            None => cell.lock_owned().await,
        };

        debug!(account_id, "Account lock acquired");

        let staged = (*guard).clone();
        tx.locked.insert(account_id, LockedAccount { guard, staged: staged.clone() });
        Ok(Some(staged))
    }
}

#[async_trait]
impl UnitOfWork for InMemoryLedgerStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        Ok(MemoryTx {
            locked: HashMap::new(),
            pending: Vec::new(),
        })
    }

    async fn commit(&self, tx: Self::Tx) -> StoreResult<()> {
        if FaultPlan::take(&self.faults.commit) {
            return Err(StoreError::Injected("commit"));
        }

        let MemoryTx { mut locked, pending } = tx;

        for entry in locked.values_mut() {
            *entry.guard = entry.staged.clone();
        }
        self.log.lock().extend(pending);

        // Guards drop here, after balances and log entries are both visible
        drop(locked);
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> StoreResult<()> {
        drop(tx);
        Ok(())
    }
}

#[async_trait]
impl AccountStore for InMemoryLedgerStore {
    async fn lock_and_get(&self, tx: &mut Self::Tx, account_id: i64) -> StoreResult<Option<Account>> {
        self.acquire(tx, account_id).await
    }

    async fn apply_delta(&self, tx: &mut Self::Tx, account_id: i64, delta: Decimal) -> StoreResult<Decimal> {
        if FaultPlan::take(&self.faults.delta) {
            return Err(StoreError::Injected("apply_delta"));
        }

        if self.acquire(tx, account_id).await?.is_none() {
            return Err(StoreError::RowVanished(account_id));
        }

        let locked = tx
            .locked
            .get_mut(&account_id)
            .ok_or(StoreError::RowVanished(account_id))?;

        let balance = locked.staged.balance + delta;
        if balance < Decimal::ZERO {
            return Err(StoreError::Constraint(format!(
                "balance of account {} would become {}",
                account_id, balance
            )));
        }

        locked.staged.balance = balance;
        Ok(balance)
    }
}

#[async_trait]
impl TransactionLogStore for InMemoryLedgerStore {
    async fn append(&self, tx: &mut Self::Tx, record: NewTransactionRecord) -> StoreResult<TransactionRecord> {
        if FaultPlan::take(&self.faults.append) {
            return Err(StoreError::Injected("append"));
        }

        if self.cell(record.account_id).is_none() {
            return Err(StoreError::Constraint(format!(
                "account {} does not exist",
                record.account_id
            )));
        }

        if record.amount <= Decimal::ZERO {
            return Err(StoreError::Constraint(format!(
                "amount {} must be positive",
                record.amount
            )));
        }

        let stored = TransactionRecord {
            id: self.next_record_id.fetch_add(1, Ordering::SeqCst),
            account_id: record.account_id,
            amount: record.amount,
            kind: record.kind,
            created_at: Utc::now(),
        };

        tx.pending.push(stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionKind;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_commit_publishes_balance_and_record() {
        let store = InMemoryLedgerStore::new();
        let account = store.seed_account("alice", dec!(10));

        let mut tx = store.begin().await.unwrap();
        store.lock_and_get(&mut tx, account.id).await.unwrap().unwrap();
        let balance = store.apply_delta(&mut tx, account.id, dec!(5)).await.unwrap();
        assert_eq!(balance, dec!(15));
        store
            .append(
                &mut tx,
                NewTransactionRecord {
                    account_id: account.id,
                    amount: dec!(5),
                    kind: TransactionKind::Credit,
                },
            )
            .await
            .unwrap();

        assert!(store.records_for(account.id).is_empty());
        store.commit(tx).await.unwrap();

        assert_eq!(store.balance(account.id).await, Some(dec!(15)));
        assert_eq!(store.records_for(account.id).len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_changes() {
        let store = InMemoryLedgerStore::new();
        let account = store.seed_account("bob", dec!(10));

        {
            let mut tx = store.begin().await.unwrap();
            store.apply_delta(&mut tx, account.id, dec!(-4)).await.unwrap();
        }

        assert_eq!(store.balance(account.id).await, Some(dec!(10)));
    }

    #[tokio::test]
    async fn test_lock_wait_times_out() {
        let store = InMemoryLedgerStore::new().with_lock_timeout(Duration::from_millis(20));
        let account = store.seed_account("carol", dec!(0));

        let mut holder = store.begin().await.unwrap();
        store.lock_and_get(&mut holder, account.id).await.unwrap();

        let mut waiter = store.begin().await.unwrap();
        let err = store.lock_and_get(&mut waiter, account.id).await.unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout(id) if id == account.id));

        store.rollback(holder).await.unwrap();
        assert!(store.lock_and_get(&mut waiter, account.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_negative_balance_is_rejected() {
        let store = InMemoryLedgerStore::new();
        let account = store.seed_account("dave", dec!(3));

        let mut tx = store.begin().await.unwrap();
        let err = store.apply_delta(&mut tx, account.id, dec!(-4)).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_unknown_account_is_not_found() {
        let store = InMemoryLedgerStore::new();
        let mut tx = store.begin().await.unwrap();
        assert!(store.lock_and_get(&mut tx, 404).await.unwrap().is_none());
    }
}
