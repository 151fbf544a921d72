// Hourly alert scan
//
// Flags settlement work that is going stale: payout requests that have sat
// pending across multiple batch runs (usually liquidity starvation) and
// disputes that have been open long enough to hold up escrow. One summary
// notification per category goes to the ops account.

use crate::error::AppResult;
use crate::escrow::repository::OrderRepository;
use crate::notifications::NotificationOutbox;
use crate::payout::repository::PayoutRepository;
use crate::settlement::RunSummary;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AlertConfig {
    pub stale_payout_after: Duration,
    pub stale_dispute_after: Duration,
    /// Recipient of operational alerts.
    pub ops_account: Uuid,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            stale_payout_after: Duration::days(3),
            stale_dispute_after: Duration::days(7),
            ops_account: Uuid::nil(),
        }
    }
}

pub struct AlertScanner {
    payouts: Arc<PayoutRepository>,
    orders: Arc<OrderRepository>,
    outbox: Arc<NotificationOutbox>,
    config: AlertConfig,
}

impl AlertScanner {
    pub fn new(
        payouts: Arc<PayoutRepository>,
        orders: Arc<OrderRepository>,
        outbox: Arc<NotificationOutbox>,
        config: AlertConfig,
    ) -> Self {
        Self {
            payouts,
            orders,
            outbox,
            config,
        }
    }

    pub async fn run(&self) -> AppResult<RunSummary> {
        let now = Utc::now();
        let mut summary = RunSummary::default();

        let stale_payouts = self
            .payouts
            .stale_pending(now - self.config.stale_payout_after)
            .await?;
        if !stale_payouts.is_empty() {
            let total: i64 = stale_payouts.iter().map(|p| p.amount_pence).sum();
            warn!(
                "⚠️ {} payout requests pending for over {} days ({}p total)",
                stale_payouts.len(),
                self.config.stale_payout_after.num_days(),
                total
            );

            match self
                .outbox
                .enqueue(
                    self.config.ops_account,
                    "stale_payouts",
                    "Payouts going stale",
                    &format!(
                        "{} payout requests have been pending for over {} days ({}p total). Check platform liquidity.",
                        stale_payouts.len(),
                        self.config.stale_payout_after.num_days(),
                        total
                    ),
                    None,
                )
                .await
            {
                Ok(_) => summary.processed += 1,
                Err(e) => summary.record_failure(format!("stale payout alert: {}", e)),
            }
        }

        let stale_disputes: Vec<_> = self
            .orders
            .stale_open_disputes(now - self.config.stale_dispute_after)
            .await?
            .into_iter()
            .filter(|dispute| dispute.status.blocks_release())
            .collect();
        if !stale_disputes.is_empty() {
            warn!(
                "⚠️ {} disputes open for over {} days",
                stale_disputes.len(),
                self.config.stale_dispute_after.num_days()
            );

            match self
                .outbox
                .enqueue(
                    self.config.ops_account,
                    "stale_disputes",
                    "Disputes need attention",
                    &format!(
                        "{} disputes have been open for over {} days and are holding escrow.",
                        stale_disputes.len(),
                        self.config.stale_dispute_after.num_days()
                    ),
                    None,
                )
                .await
            {
                Ok(_) => summary.processed += 1,
                Err(e) => summary.record_failure(format!("stale dispute alert: {}", e)),
            }
        }

        info!(
            "✓ Alert scan complete: {} alerts raised, {} failed",
            summary.processed, summary.failed
        );
        Ok(summary)
    }
}
