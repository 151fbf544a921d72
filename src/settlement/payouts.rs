// Payout batch
//
// Converts pending payout requests into provider transfers, oldest first,
// bounded by the provider balance available at the start of the run. The
// available balance is an explicit running total threaded through the
// loop: each submitted transfer decrements it, so one batch can never
// commit more than the provider holds.

use crate::error::{AppError, AppResult};
use crate::notifications::NotificationOutbox;
use crate::payout::models::{PayoutRequest, PayoutStatus, SkipReason};
use crate::payout::repository::PayoutRepository;
use crate::provider::{DestinationStatus, PaymentProvider, TransferRequest};
use crate::settlement::RunSummary;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct PayoutConfig {
    /// Settlement currency (minor units everywhere).
    pub currency: String,
    pub min_amount: i64,
}

#[derive(Debug)]
enum PayoutOutcome {
    Submitted,
    Skipped(SkipReason),
    Failed(String),
}

pub struct PayoutProcessor {
    payouts: Arc<PayoutRepository>,
    provider: Arc<dyn PaymentProvider>,
    outbox: Arc<NotificationOutbox>,
    config: PayoutConfig,
}

impl PayoutProcessor {
    pub fn new(
        payouts: Arc<PayoutRepository>,
        provider: Arc<dyn PaymentProvider>,
        outbox: Arc<NotificationOutbox>,
        config: PayoutConfig,
    ) -> Self {
        Self {
            payouts,
            provider,
            outbox,
            config,
        }
    }

    /// Run one payout batch. Fatal only when the provider balance or the
    /// candidate set cannot be fetched; everything after that is per-item.
    pub async fn run(&self) -> AppResult<RunSummary> {
        let mut available = self.provider.available_balance(&self.config.currency).await?;
        let pending = self.payouts.pending_oldest_first().await?;

        info!(
            "🔄 Payout batch: {} pending requests, {} {} available",
            pending.len(),
            available,
            self.config.currency
        );

        let mut summary = RunSummary::default();
        for request in pending {
            match self.process_request(&request, &mut available).await {
                Ok(PayoutOutcome::Submitted) => summary.processed += 1,
                Ok(PayoutOutcome::Skipped(reason)) => {
                    info!("⏭️ Payout {} skipped: {}", request.id, reason);
                    summary.skipped += 1;
                }
                Ok(PayoutOutcome::Failed(message)) => {
                    summary.record_failure(format!("payout {}: {}", request.id, message));
                }
                Err(e) => {
                    error!("Payout {} errored: {}", request.id, e);
                    summary.record_failure(format!("payout {}: {}", request.id, e));
                }
            }
        }

        info!(
            "✓ Payout batch complete: {} submitted, {} skipped, {} failed, {} {} left",
            summary.processed, summary.skipped, summary.failed, available, self.config.currency
        );
        Ok(summary)
    }

    async fn process_request(
        &self,
        request: &PayoutRequest,
        available: &mut i64,
    ) -> AppResult<PayoutOutcome> {
        if !request.status.can_transition_to(PayoutStatus::InTransit) {
            return Ok(PayoutOutcome::Skipped(SkipReason::AlreadySubmitted));
        }

        let destination = self
            .provider
            .destination_status(&request.destination_account)
            .await?;

        if let Err(reason) = payout_gate(
            request.amount_pence,
            &destination,
            *available,
            self.config.min_amount,
        ) {
            // Skipped requests stay pending for a future run.
            return Ok(PayoutOutcome::Skipped(reason));
        }

        let transfer = self
            .provider
            .create_transfer(TransferRequest {
                amount: request.amount_pence,
                currency: &self.config.currency,
                destination: &request.destination_account,
                idempotency_key: &request.id.to_string(),
                reference: &format!("payout_{}", request.id),
            })
            .await;

        match transfer {
            Ok(receipt) => {
                *available -= request.amount_pence;

                let flipped = self
                    .payouts
                    .mark_in_transit(request.id, &receipt.transfer_id)
                    .await?;
                if !flipped {
                    // An overlapping run submitted first; the idempotency
                    // key made our provider call a no-op.
                    return Ok(PayoutOutcome::Skipped(SkipReason::AlreadySubmitted));
                }

                if let Err(e) = self
                    .outbox
                    .enqueue(
                        request.seller_id,
                        "payout_in_transit",
                        "Payout on its way",
                        &format!(
                            "Your payout of {}p is on its way to your bank account.",
                            request.amount_pence
                        ),
                        None,
                    )
                    .await
                {
                    warn!("Failed to queue payout notification: {}", e);
                }

                Ok(PayoutOutcome::Submitted)
            }
            Err(AppError::Provider(e)) => {
                let message = e.to_string();
                error!("Transfer failed for payout {}: {}", request.id, message);
                self.payouts
                    .mark_failed_from_pending(request.id, &message)
                    .await?;
                Ok(PayoutOutcome::Failed(message))
            }
            Err(e) => Err(e),
        }
    }
}

/// Eligibility checks for one request against the running balance, in the
/// order the pipeline applies them. `Err` is the skip reason; the request
/// stays pending.
pub fn payout_gate(
    amount: i64,
    destination: &DestinationStatus,
    available: i64,
    min_amount: i64,
) -> Result<(), SkipReason> {
    if !destination.is_ready() {
        return Err(SkipReason::SellerNotOnboarded);
    }
    if amount < min_amount {
        return Err(SkipReason::BelowMinimum);
    }
    if amount > available {
        return Err(SkipReason::InsufficientLiquidity);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> DestinationStatus {
        DestinationStatus {
            exists: true,
            payouts_enabled: true,
        }
    }

    #[test]
    fn test_gate_rejects_unverified_destination() {
        let dest = DestinationStatus {
            exists: true,
            payouts_enabled: false,
        };
        assert_eq!(
            payout_gate(5_000, &dest, 100_000, 100),
            Err(SkipReason::SellerNotOnboarded)
        );
    }

    #[test]
    fn test_gate_rejects_below_minimum() {
        assert_eq!(
            payout_gate(99, &ready(), 100_000, 100),
            Err(SkipReason::BelowMinimum)
        );
        assert_eq!(payout_gate(100, &ready(), 100_000, 100), Ok(()));
    }

    #[test]
    fn test_gate_rejects_insufficient_liquidity() {
        assert_eq!(
            payout_gate(5_000, &ready(), 4_999, 100),
            Err(SkipReason::InsufficientLiquidity)
        );
        assert_eq!(payout_gate(5_000, &ready(), 5_000, 100), Ok(()));
    }

    #[test]
    fn test_onboarding_checked_before_liquidity() {
        let dest = DestinationStatus {
            exists: false,
            payouts_enabled: false,
        };
        assert_eq!(
            payout_gate(5_000, &dest, 0, 100),
            Err(SkipReason::SellerNotOnboarded)
        );
    }

    #[test]
    fn test_batch_exhausts_liquidity_oldest_first() {
        // Requests in creation order against 1,000p of liquidity: the
        // first two fit, the third is deferred, a later smaller one still
        // fits what remains.
        let amounts = [600, 300, 500, 100];
        let mut available = 1_000i64;
        let mut outcomes = Vec::new();

        for amount in amounts {
            match payout_gate(amount, &ready(), available, 100) {
                Ok(()) => {
                    available -= amount;
                    outcomes.push("submitted");
                }
                Err(SkipReason::InsufficientLiquidity) => outcomes.push("pending"),
                Err(other) => panic!("unexpected skip: {}", other),
            }
        }

        assert_eq!(outcomes, vec!["submitted", "submitted", "pending", "submitted"]);
        assert_eq!(available, 0);
    }
}
