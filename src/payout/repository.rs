use super::models::{PayoutRequest, PayoutStatus};
use crate::error::AppResult;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

const PAYOUT_COLUMNS: &str = "id, seller_id, amount_pence, status, transfer_id, \
     destination_account, notes, created_at, processed_at";

/// Payout request store. Status flips are guarded so that an overlapping
/// batch run or a duplicate webhook delivery cannot settle a request
/// twice.
pub struct PayoutRepository {
    pub pool: PgPool,
}

impl PayoutRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, payout_id: Uuid) -> AppResult<Option<PayoutRequest>> {
        let request = sqlx::query_as::<_, PayoutRequest>(&format!(
            "SELECT {} FROM payout_requests WHERE id = $1",
            PAYOUT_COLUMNS
        ))
        .bind(payout_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(request)
    }

    /// Pending requests, oldest first (fairness under liquidity pressure).
    pub async fn pending_oldest_first(&self) -> AppResult<Vec<PayoutRequest>> {
        let requests = sqlx::query_as::<_, PayoutRequest>(&format!(
            r#"
            SELECT {}
            FROM payout_requests
            WHERE status = $1
            ORDER BY created_at ASC
            "#,
            PAYOUT_COLUMNS
        ))
        .bind(PayoutStatus::Pending)
        .fetch_all(&self.pool)
        .await?;

        Ok(requests)
    }

    /// Pending requests older than the cutoff, for the alerts job.
    pub async fn stale_pending(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<PayoutRequest>> {
        let requests = sqlx::query_as::<_, PayoutRequest>(&format!(
            r#"
            SELECT {}
            FROM payout_requests
            WHERE status = $1 AND created_at <= $2
            ORDER BY created_at ASC
            "#,
            PAYOUT_COLUMNS
        ))
        .bind(PayoutStatus::Pending)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(requests)
    }

    /// Flip `pending → in_transit` and record the provider transfer id.
    /// Returns false when another invocation already submitted the request.
    pub async fn mark_in_transit(&self, payout_id: Uuid, transfer_id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payout_requests
            SET status = $2, transfer_id = $3
            WHERE id = $1 AND status = $4
            "#,
        )
        .bind(payout_id)
        .bind(PayoutStatus::InTransit)
        .bind(transfer_id)
        .bind(PayoutStatus::Pending)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a provider rejection at submission time. The request will not
    /// be retried automatically; the seller raises a new one.
    pub async fn mark_failed_from_pending(&self, payout_id: Uuid, note: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payout_requests
            SET status = $2, notes = $3, processed_at = NOW()
            WHERE id = $1 AND status = $4
            "#,
        )
        .bind(payout_id)
        .bind(PayoutStatus::Failed)
        .bind(note)
        .bind(PayoutStatus::Pending)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Apply an asynchronous settlement confirmation by transfer id. The
    /// `in_transit` guard makes duplicate webhook deliveries no-ops, so a
    /// confirmation can never double-settle.
    pub async fn settle_by_transfer(
        &self,
        transfer_id: &str,
        outcome: PayoutStatus,
        note: Option<&str>,
    ) -> AppResult<Option<PayoutRequest>> {
        let request = sqlx::query_as::<_, PayoutRequest>(&format!(
            r#"
            UPDATE payout_requests
            SET status = $2, notes = COALESCE($3, notes), processed_at = NOW()
            WHERE transfer_id = $1 AND status = $4
            RETURNING {}
            "#,
            PAYOUT_COLUMNS
        ))
        .bind(transfer_id)
        .bind(outcome)
        .bind(note)
        .bind(PayoutStatus::InTransit)
        .fetch_optional(&self.pool)
        .await?;

        Ok(request)
    }
}
