use super::models::{EntryType, LedgerEntry, XpAccount};
use crate::error::{AppResult, LedgerError};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Ledger repository - the source of truth for all XP balances.
///
/// Every balance mutation goes through `append`/`append_in_tx`. The cached
/// row in `xp_accounts` is updated in the same transaction as the entry
/// insert, so the projection cannot drift from the ledger sum. The
/// conditional UPDATE doubles as the overdraft guard and takes a row lock,
/// which serialises concurrent writers against the same account.
pub struct LedgerRepository {
    pub pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn begin_tx(&self) -> AppResult<Transaction<'_, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    /// Append a single entry in its own transaction.
    pub async fn append(
        &self,
        account_id: Uuid,
        amount: i64,
        entry_type: EntryType,
        reference_type: &str,
        reference_id: Uuid,
    ) -> AppResult<LedgerEntry> {
        let mut tx = self.begin_tx().await?;
        let entry = self
            .append_in_tx(&mut tx, account_id, amount, entry_type, reference_type, reference_id)
            .await?;
        tx.commit().await?;
        Ok(entry)
    }

    /// Append an entry inside a caller-owned transaction. Used by the
    /// escrow release routine to commit both halves of a settlement
    /// atomically.
    pub async fn append_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        account_id: Uuid,
        amount: i64,
        entry_type: EntryType,
        reference_type: &str,
        reference_id: Uuid,
    ) -> AppResult<LedgerEntry> {
        let balance_after = if amount >= 0 {
            sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO xp_accounts (account_id, balance)
                VALUES ($1, $2)
                ON CONFLICT (account_id)
                DO UPDATE SET balance = xp_accounts.balance + $2, updated_at = NOW()
                RETURNING balance
                "#,
            )
            .bind(account_id)
            .bind(amount)
            .fetch_one(&mut **tx)
            .await?
        } else {
            // Guarded debit: zero rows affected means the projected balance
            // would go negative.
            let updated = sqlx::query_scalar::<_, i64>(
                r#"
                UPDATE xp_accounts
                SET balance = balance + $2, updated_at = NOW()
                WHERE account_id = $1 AND balance + $2 >= 0
                RETURNING balance
                "#,
            )
            .bind(account_id)
            .bind(amount)
            .fetch_optional(&mut **tx)
            .await?;

            match updated {
                Some(balance) => balance,
                None => {
                    let available = self.cached_balance_in_tx(tx, account_id).await?;
                    return Err(LedgerError::InsufficientFunds {
                        account: account_id,
                        required: -amount,
                        available,
                    }
                    .into());
                }
            }
        };

        let entry = sqlx::query_as::<_, LedgerEntry>(
            r#"
            INSERT INTO xp_ledger (id, account_id, amount, entry_type, reference_type, reference_id, balance_after)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, account_id, amount, entry_type, reference_type, reference_id, balance_after, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(account_id)
        .bind(amount)
        .bind(entry_type)
        .bind(reference_type)
        .bind(reference_id)
        .bind(balance_after)
        .fetch_one(&mut **tx)
        .await?;

        tracing::debug!(
            "Ledger entry {}: {} {} on {} (balance {})",
            entry.id,
            entry_type,
            amount,
            account_id,
            balance_after
        );

        Ok(entry)
    }

    /// Signed sum of all entries for an account. Never negative by the
    /// append-time guard.
    pub async fn get_balance(&self, account_id: Uuid) -> AppResult<i64> {
        let balance = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM xp_ledger WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(balance)
    }

    /// Read the denormalised projection without touching the ledger.
    pub async fn cached_balance(&self, account_id: Uuid) -> AppResult<Option<XpAccount>> {
        let account = sqlx::query_as::<_, XpAccount>(
            "SELECT account_id, balance, updated_at FROM xp_accounts WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn cached_balance_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        account_id: Uuid,
    ) -> AppResult<i64> {
        let balance = sqlx::query_scalar::<_, i64>(
            "SELECT balance FROM xp_accounts WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(balance.unwrap_or(0))
    }

    /// Repair the projection from the ledger sum. The ledger wins whenever
    /// the two disagree.
    pub async fn recompute_cached_balance(&self, account_id: Uuid) -> AppResult<i64> {
        let balance = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO xp_accounts (account_id, balance)
            SELECT $1, COALESCE(SUM(amount), 0)::BIGINT FROM xp_ledger WHERE account_id = $1
            ON CONFLICT (account_id)
            DO UPDATE SET balance = EXCLUDED.balance, updated_at = NOW()
            RETURNING balance
            "#,
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(balance)
    }

    pub async fn entries_for_account(
        &self,
        account_id: Uuid,
        limit: i64,
    ) -> AppResult<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, account_id, amount, entry_type, reference_type, reference_id, balance_after, created_at
            FROM xp_ledger
            WHERE account_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Whether the account has ever appeared in the ledger. Used by the
    /// release job to report orders whose seller is unknown.
    pub async fn account_exists(&self, account_id: Uuid) -> AppResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM xp_accounts WHERE account_id = $1)",
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}
