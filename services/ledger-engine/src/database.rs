use crate::config::DatabaseConfig;
use crate::errors::{StoreError, StoreResult};
use crate::handlers::HealthProbe;
use crate::models::{Account, NewTransactionRecord, TransactionRecord};
use crate::store::{AccountStore, TransactionLogStore, UnitOfWork};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{debug, info};

/// Postgres-backed account and transaction log store
pub struct PgLedgerStore {
    pool: PgPool,
    lock_timeout_ms: u64,
}

impl PgLedgerStore {
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.connection_url())
            .await?;

        info!(
            "Connected to Postgres (max_connections={}, lock_timeout={}ms)",
            config.max_connections, config.lock_timeout_ms
        );

        Ok(Self::from_pool(pool, config.lock_timeout_ms))
    }

    pub fn from_pool(pool: PgPool, lock_timeout_ms: u64) -> Self {
        PgLedgerStore {
            pool,
            lock_timeout_ms,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.into()))?;
        Ok(())
    }

    /// Round-trip to the database for readiness checks
    pub async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Insert an account row. Accounts are provisioned outside the ledger;
    /// this exists for provisioning scripts and integration tests.
    pub async fn create_account(&self, display_name: &str) -> StoreResult<Account> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (display_name)
            VALUES ($1)
            RETURNING id, display_name, balance, created_at
            "#,
        )
        .bind(display_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(account)
    }

    /// Committed balance, read without locking
    pub async fn balance(&self, account_id: i64) -> StoreResult<Option<Decimal>> {
        let balance = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT balance FROM accounts WHERE id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(balance)
    }

    /// Committed log entries of one account, oldest first
    pub async fn records_for(&self, account_id: i64) -> StoreResult<Vec<TransactionRecord>> {
        let records = sqlx::query_as::<_, TransactionRecord>(
            r#"
            SELECT id, account_id, amount, kind, created_at
            FROM transactions
            WHERE account_id = $1
            ORDER BY id
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}

#[async_trait]
impl UnitOfWork for PgLedgerStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        let mut tx = self.pool.begin().await?;

        // Bounds every row lock wait inside this transaction
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout_ms))
            .execute(&mut *tx)
            .await?;

        Ok(tx)
    }

    async fn commit(&self, tx: Self::Tx) -> StoreResult<()> {
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> StoreResult<()> {
        tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for PgLedgerStore {
    async fn lock_and_get(&self, tx: &mut Self::Tx, account_id: i64) -> StoreResult<Option<Account>> {
        debug!(account_id, "Locking account row");

        sqlx::query_as::<_, Account>(
            r#"
            SELECT id, display_name, balance, created_at
            FROM accounts
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(account_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| StoreError::from_sqlx(e, account_id))
    }

    async fn apply_delta(&self, tx: &mut Self::Tx, account_id: i64, delta: Decimal) -> StoreResult<Decimal> {
        let balance = sqlx::query_scalar::<_, Decimal>(
            r#"
            UPDATE accounts
            SET balance = balance + $1
            WHERE id = $2
            RETURNING balance
            "#,
        )
        .bind(delta)
        .bind(account_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| StoreError::from_sqlx(e, account_id))?;

        balance.ok_or(StoreError::RowVanished(account_id))
    }
}

#[async_trait]
impl TransactionLogStore for PgLedgerStore {
    async fn append(&self, tx: &mut Self::Tx, record: NewTransactionRecord) -> StoreResult<TransactionRecord> {
        sqlx::query_as::<_, TransactionRecord>(
            r#"
            INSERT INTO transactions (account_id, amount, kind)
            VALUES ($1, $2, $3)
            RETURNING id, account_id, amount, kind, created_at
            "#,
        )
        .bind(record.account_id)
        .bind(record.amount)
        .bind(record.kind)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| StoreError::from_sqlx(e, record.account_id))
    }
}

#[async_trait(?Send)]
impl HealthProbe for PgLedgerStore {
    async fn check(&self) -> Result<(), String> {
        self.ping().await.map_err(|e| e.to_string())
    }
}
