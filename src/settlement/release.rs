// Escrow release
//
// Release flow per order:
// 1. Check for an unresolved dispute (skip, not an error)
// 2. Split the order total into platform fee and seller share
// 3. In one transaction: guarded status flip escrow -> completed, then
//    both ledger credits. The flip's row guard is what makes overlapping
//    invocations safe; the transaction is what keeps the two credits
//    inseparable.
// 4. Queue buyer and seller notifications

use crate::error::{AppError, AppResult};
use crate::escrow::models::{Order, OrderStatus, ReleaseActor};
use crate::escrow::repository::OrderRepository;
use crate::ledger::models::EntryType;
use crate::ledger::repository::LedgerRepository;
use crate::notifications::NotificationOutbox;
use crate::settlement::{fee_split, RunSummary};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ReleaseConfig {
    pub grace: Duration,
    pub fee_rate: Decimal,
    pub platform_account: Uuid,
}

/// Outcome of a single release attempt.
#[derive(Debug)]
pub enum ReleaseOutcome {
    Released,
    Skipped(SkipCause),
}

#[derive(Debug, PartialEq, Eq)]
pub enum SkipCause {
    DisputeOpen,
    SellerUnknown,
    /// The status guard found the order already settled - a benign race
    /// with an overlapping invocation or a manual release.
    AlreadySettled,
}

pub struct EscrowReleaser {
    orders: Arc<OrderRepository>,
    ledger: Arc<LedgerRepository>,
    outbox: Arc<NotificationOutbox>,
    config: ReleaseConfig,
}

impl EscrowReleaser {
    pub fn new(
        orders: Arc<OrderRepository>,
        ledger: Arc<LedgerRepository>,
        outbox: Arc<NotificationOutbox>,
        config: ReleaseConfig,
    ) -> Self {
        Self {
            orders,
            ledger,
            outbox,
            config,
        }
    }

    /// Auto-release batch: settle every delivered order past the grace
    /// period unless blocked. Per-order failures are recorded and the
    /// batch continues; only the candidate query itself is fatal.
    pub async fn run(&self) -> AppResult<RunSummary> {
        let now = Utc::now();
        let candidates = self.orders.release_candidates(now - self.config.grace).await?;

        info!("🔄 Escrow release: {} candidate orders", candidates.len());

        let mut summary = RunSummary::default();
        for order in candidates {
            // The query already applied the cutoff; re-check against the
            // order itself so a stale candidate row can never settle early.
            if !order.past_grace_period(now, self.config.grace) {
                summary.skipped += 1;
                continue;
            }
            match self.release_order(&order, ReleaseActor::Auto).await {
                Ok(ReleaseOutcome::Released) => summary.processed += 1,
                Ok(ReleaseOutcome::Skipped(SkipCause::SellerUnknown)) => {
                    summary.record_reported_skip(format!(
                        "order {}: seller account {} not found",
                        order.id, order.seller_id
                    ));
                }
                Ok(ReleaseOutcome::Skipped(_)) => summary.skipped += 1,
                Err(e) => {
                    error!("Release failed for order {}: {}", order.id, e);
                    summary.record_failure(format!("order {}: {}", order.id, e));
                }
            }
        }

        info!(
            "✓ Escrow release complete: {} released, {} skipped, {} failed",
            summary.processed, summary.skipped, summary.failed
        );
        Ok(summary)
    }

    /// User-initiated release. The grace period does not apply; dispute
    /// blocking and the status guard do.
    pub async fn release_manual(&self, order_id: Uuid, actor: ReleaseActor) -> AppResult<Order> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order not found: {}", order_id)))?;

        if !order.status.can_transition_to(OrderStatus::Completed) {
            return Err(crate::error::SettlementError::InvalidStateTransition {
                entity: "order",
                id: order_id,
                current: order.status.as_str().to_string(),
                expected: OrderStatus::Escrow.as_str().to_string(),
            }
            .into());
        }

        match self.release_order(&order, actor).await? {
            ReleaseOutcome::Released => {
                self.orders.get_order(order_id).await?.ok_or_else(|| {
                    AppError::NotFound(format!("Order not found after release: {}", order_id))
                })
            }
            ReleaseOutcome::Skipped(SkipCause::DisputeOpen) => {
                Err(crate::error::SettlementError::DisputeOpen(order_id).into())
            }
            ReleaseOutcome::Skipped(SkipCause::SellerUnknown) => {
                Err(crate::error::LedgerError::AccountNotFound(order.seller_id).into())
            }
            ReleaseOutcome::Skipped(SkipCause::AlreadySettled) => {
                Err(crate::error::SettlementError::InvalidStateTransition {
                    entity: "order",
                    id: order_id,
                    current: order.status.as_str().to_string(),
                    expected: OrderStatus::Escrow.as_str().to_string(),
                }
                .into())
            }
        }
    }

    async fn release_order(
        &self,
        order: &Order,
        released_by: ReleaseActor,
    ) -> AppResult<ReleaseOutcome> {
        if self.orders.has_blocking_dispute(order.id).await? {
            info!("⏭️ Order {} blocked by open dispute, skipping", order.id);
            return Ok(ReleaseOutcome::Skipped(SkipCause::DisputeOpen));
        }

        if !self.ledger.account_exists(order.seller_id).await? {
            warn!(
                "⚠️ Order {} seller account {} not found, skipping",
                order.id, order.seller_id
            );
            return Ok(ReleaseOutcome::Skipped(SkipCause::SellerUnknown));
        }

        let split = fee_split(order.amount, self.config.fee_rate)?;

        // The flip and both ledger credits commit together. Doing the
        // guarded flip first takes the row lock, so a concurrent release
        // of the same order blocks here and then sees zero rows.
        let mut tx = self.ledger.begin_tx().await?;

        let flipped = self
            .orders
            .mark_completed_in_tx(&mut tx, order.id, released_by, split.fee, split.net)
            .await?;

        if !flipped {
            tx.rollback().await?;
            return Ok(ReleaseOutcome::Skipped(SkipCause::AlreadySettled));
        }

        self.ledger
            .append_in_tx(
                &mut tx,
                order.seller_id,
                split.net,
                EntryType::EscrowRelease,
                "order",
                order.id,
            )
            .await?;

        self.ledger
            .append_in_tx(
                &mut tx,
                self.config.platform_account,
                split.fee,
                EntryType::PlatformFee,
                "order",
                order.id,
            )
            .await?;

        tx.commit().await?;

        info!(
            "✓ Order {} released by {}: {} to seller, {} platform fee",
            order.id,
            released_by.as_str(),
            split.net,
            split.fee
        );

        self.notify_settled(order, split.net).await;

        Ok(ReleaseOutcome::Released)
    }

    /// Refund routine: terminal flip, no ledger entries. GBP refunds settle
    /// provider-side; XP never left the buyer's escrow hold in the ledger.
    pub async fn refund(&self, order_id: Uuid) -> AppResult<Order> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order not found: {}", order_id)))?;

        if !order.status.can_transition_to(OrderStatus::Refunded) {
            return Err(crate::error::SettlementError::InvalidStateTransition {
                entity: "order",
                id: order_id,
                current: order.status.as_str().to_string(),
                expected: "escrow or disputed".to_string(),
            }
            .into());
        }

        let flipped = self.orders.mark_refunded(order_id).await?;
        if !flipped {
            return Err(crate::error::SettlementError::InvalidStateTransition {
                entity: "order",
                id: order_id,
                current: order.status.as_str().to_string(),
                expected: "escrow or disputed".to_string(),
            }
            .into());
        }

        if let Err(e) = self
            .outbox
            .enqueue(
                order.buyer_id,
                "order_refunded",
                "Order refunded",
                &format!("Your order {} has been refunded.", order.id),
                None,
            )
            .await
        {
            warn!("Failed to queue refund notification: {}", e);
        }

        self.orders.get_order(order_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("Order not found after refund: {}", order_id))
        })
    }

    async fn notify_settled(&self, order: &Order, seller_received: i64) {
        // Notification failures never unwind a committed settlement.
        let seller = self
            .outbox
            .enqueue(
                order.seller_id,
                "escrow_released",
                "Funds released",
                &format!(
                    "Escrow for order {} has been released: {} credited to your balance.",
                    order.id, seller_received
                ),
                None,
            )
            .await;
        if let Err(e) = seller {
            warn!("Failed to queue seller notification: {}", e);
        }

        let buyer = self
            .outbox
            .enqueue(
                order.buyer_id,
                "order_completed",
                "Order complete",
                &format!("Order {} is complete and funds have been released.", order.id),
                None,
            )
            .await;
        if let Err(e) = buyer {
            warn!("Failed to queue buyer notification: {}", e);
        }
    }
}
