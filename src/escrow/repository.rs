use super::models::{Dispute, DisputeStatus, Order, OrderStatus, ReleaseActor};
use crate::error::AppResult;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

const ORDER_COLUMNS: &str = "id, buyer_id, seller_id, amount, currency, status, delivered_at, \
     escrow_released_at, escrow_released_by, platform_fee, seller_received, created_at, updated_at";

/// Escrow order store. All status flips are guarded conditional updates so
/// that overlapping job invocations and user-initiated mutations cannot
/// double-settle the same order.
pub struct OrderRepository {
    pub pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_order(&self, order_id: Uuid) -> AppResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    /// Orders still in escrow, delivered before the cutoff. Oldest first so
    /// a timed-out invocation makes progress from the front of the queue on
    /// the next run.
    pub async fn release_candidates(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            r#"
            SELECT {}
            FROM orders
            WHERE status = $1 AND delivered_at IS NOT NULL AND delivered_at <= $2
            ORDER BY delivered_at ASC
            "#,
            ORDER_COLUMNS
        ))
        .bind(OrderStatus::Escrow)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    /// Whether any open or investigating dispute references the order.
    pub async fn has_blocking_dispute(&self, order_id: Uuid) -> AppResult<bool> {
        let blocked = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM disputes WHERE order_id = $1 AND status != $2)",
        )
        .bind(order_id)
        .bind(DisputeStatus::Resolved)
        .fetch_one(&self.pool)
        .await?;

        Ok(blocked)
    }

    /// Flip `escrow → completed` and stamp the settlement fields. Returns
    /// false when the guard rejects the update (the order was no longer in
    /// escrow), which callers treat as a benign race.
    pub async fn mark_completed_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
        released_by: ReleaseActor,
        platform_fee: i64,
        seller_received: i64,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, escrow_released_at = NOW(), escrow_released_by = $3,
                platform_fee = $4, seller_received = $5, updated_at = NOW()
            WHERE id = $1 AND status = $6
            "#,
        )
        .bind(order_id)
        .bind(OrderStatus::Completed)
        .bind(released_by)
        .bind(platform_fee)
        .bind(seller_received)
        .bind(OrderStatus::Escrow)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Flip `escrow|disputed → refunded`. Terminal; no ledger entries are
    /// written (refunds settle provider-side for GBP orders).
    pub async fn mark_refunded(&self, order_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND (status = $3 OR status = $4)
            "#,
        )
        .bind(order_id)
        .bind(OrderStatus::Refunded)
        .bind(OrderStatus::Escrow)
        .bind(OrderStatus::Disputed)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn disputes_for_order(&self, order_id: Uuid) -> AppResult<Vec<Dispute>> {
        let disputes = sqlx::query_as::<_, Dispute>(
            r#"
            SELECT id, order_id, status, reason, created_at, updated_at
            FROM disputes
            WHERE order_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(disputes)
    }

    /// Disputes that have been open longer than the cutoff. Input to the
    /// hourly alerts job.
    pub async fn stale_open_disputes(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Dispute>> {
        let disputes = sqlx::query_as::<_, Dispute>(
            r#"
            SELECT id, order_id, status, reason, created_at, updated_at
            FROM disputes
            WHERE status != $1 AND created_at <= $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(DisputeStatus::Resolved)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(disputes)
    }
}
