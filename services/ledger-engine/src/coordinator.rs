//! Credit and debit against a single account.
//!
//! One invocation runs in one store transaction:
//! lock the account row, validate, apply the delta in place, append the
//! log record, commit. Any failure after `begin` rolls the transaction back
//! so neither the balance change nor the record survives.

use crate::config::LedgerConfig;
use crate::errors::{LedgerError, Result};
use crate::metrics;
use crate::models::{LedgerReceipt, NewTransactionRecord, TransactionKind};
use crate::store::{LedgerStore, UnitOfWork};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Bounds applied to every amount before any lock is taken
#[derive(Debug, Clone)]
pub struct LedgerLimits {
    pub max_amount: Decimal,
    pub decimal_precision: u32,
}

impl Default for LedgerLimits {
    fn default() -> Self {
        LedgerLimits {
            max_amount: Decimal::from(1_000_000_000u64),
            decimal_precision: 4,
        }
    }
}

impl From<&LedgerConfig> for LedgerLimits {
    fn from(config: &LedgerConfig) -> Self {
        LedgerLimits {
            max_amount: config.max_amount,
            decimal_precision: config.decimal_precision,
        }
    }
}

/// Progress of one invocation. States only move forward and every
/// invocation ends in `Committed` or `RolledBack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OperationState {
    Started,
    Locked,
    Validated,
    Mutated,
    Logged,
    Committed,
    RolledBack,
}

struct Operation {
    kind: TransactionKind,
    account_id: i64,
    state: OperationState,
}

impl Operation {
    fn new(kind: TransactionKind, account_id: i64) -> Self {
        Operation {
            kind,
            account_id,
            state: OperationState::Started,
        }
    }

    fn advance(&mut self, next: OperationState) {
        debug_assert!(
            next > self.state,
            "operation cannot move from {:?} to {:?}",
            self.state,
            next
        );
        debug!(
            kind = %self.kind,
            account_id = self.account_id,
            from = ?self.state,
            to = ?next,
            "Ledger operation state change"
        );
        self.state = next;
    }
}

pub struct LedgerCoordinator<S> {
    store: Arc<S>,
    limits: LedgerLimits,
}

impl<S: LedgerStore> LedgerCoordinator<S> {
    pub fn new(store: Arc<S>, limits: LedgerLimits) -> Self {
        LedgerCoordinator { store, limits }
    }

    /// Add `amount` to the account balance
    pub async fn credit(&self, account_id: i64, amount: Decimal) -> Result<LedgerReceipt> {
        self.execute(TransactionKind::Credit, account_id, amount).await
    }

    /// Subtract `amount` from the account balance; fails when the balance
    /// held under lock is smaller than `amount`
    pub async fn debit(&self, account_id: i64, amount: Decimal) -> Result<LedgerReceipt> {
        self.execute(TransactionKind::Debit, account_id, amount).await
    }

    async fn execute(
        &self,
        kind: TransactionKind,
        account_id: i64,
        amount: Decimal,
    ) -> Result<LedgerReceipt> {
        let started = Instant::now();
        let result = self.run(kind, account_id, amount).await;
        metrics::observe_operation(kind, &result, amount, started.elapsed());

        match &result {
            Ok(receipt) => info!(
                kind = %kind,
                account_id,
                %amount,
                transaction_id = receipt.transaction_id,
                new_balance = %receipt.new_balance,
                "Ledger operation committed"
            ),
            Err(LedgerError::OperationFailed(cause)) => error!(
                kind = %kind,
                account_id,
                %amount,
                retryable = cause.is_retryable(),
                "Ledger operation failed: {}",
                cause
            ),
            Err(err) => warn!(kind = %kind, account_id, %amount, "Ledger operation rejected: {}", err),
        }

        result
    }

    async fn run(&self, kind: TransactionKind, account_id: i64, amount: Decimal) -> Result<LedgerReceipt> {
        self.validate_amount(amount)?;

        let mut tx = self.store.begin().await?;
        let mut op = Operation::new(kind, account_id);

        match self.apply(&mut op, &mut tx, amount).await {
            Ok(receipt) => match self.store.commit(tx).await {
                Ok(()) => {
                    op.advance(OperationState::Committed);
                    Ok(receipt)
                }
                Err(err) => {
                    op.advance(OperationState::RolledBack);
                    Err(err.into())
                }
            },
            Err(err) => {
                if let Err(rollback_err) = self.store.rollback(tx).await {
                    warn!(
                        kind = %kind,
                        account_id,
                        "Rollback failed, transaction discarded by store: {}",
                        rollback_err
                    );
                }
                op.advance(OperationState::RolledBack);
                Err(err)
            }
        }
    }

    async fn apply(&self, op: &mut Operation, tx: &mut <S as UnitOfWork>::Tx, amount: Decimal) -> Result<LedgerReceipt> {
        let account = self
            .store
            .lock_and_get(tx, op.account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(op.account_id))?;
        op.advance(OperationState::Locked);

        if op.kind == TransactionKind::Debit && account.balance < amount {
            return Err(LedgerError::InsufficientFunds {
                required: amount,
                available: account.balance,
            });
        }
        op.advance(OperationState::Validated);

        let new_balance = self
            .store
            .apply_delta(tx, op.account_id, op.kind.delta(amount))
            .await?;
        op.advance(OperationState::Mutated);

        let record = self
            .store
            .append(
                tx,
                NewTransactionRecord {
                    account_id: op.account_id,
                    amount,
                    kind: op.kind,
                },
            )
            .await?;
        op.advance(OperationState::Logged);

        Ok(LedgerReceipt {
            transaction_id: record.id,
            new_balance,
        })
    }

    fn validate_amount(&self, amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::Validation(
                "Amount must be greater than zero".to_string(),
            ));
        }

        if amount > self.limits.max_amount {
            return Err(LedgerError::Validation(format!(
                "Amount exceeds maximum of {}",
                self.limits.max_amount
            )));
        }

        if amount.normalize().scale() > self.limits.decimal_precision {
            return Err(LedgerError::Validation(format!(
                "Amount supports at most {} decimal places",
                self.limits.decimal_precision
            )));
        }

        Ok(())
    }
}
