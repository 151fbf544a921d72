use crate::api::models::{PayoutEventPayload, WebhookAcceptedResponse};
use crate::error::{AppError, AppResult};
use crate::notifications::NotificationOutbox;
use crate::payout::models::PayoutStatus;
use crate::payout::repository::PayoutRepository;
use std::sync::Arc;
use tokio::spawn;
use tracing::{error, info, warn};

/// Applies provider settlement confirmations to payout requests. Accepts
/// the webhook immediately and processes in the background; application is
/// idempotent by transfer id (the `in_transit` guard), so redelivery of
/// the same event never double-settles.
pub struct PayoutWebhookProcessor {
    payouts: Arc<PayoutRepository>,
    outbox: Arc<NotificationOutbox>,
}

impl PayoutWebhookProcessor {
    pub fn new(payouts: Arc<PayoutRepository>, outbox: Arc<NotificationOutbox>) -> Self {
        Self { payouts, outbox }
    }

    /// Accept the webhook and return 202 immediately.
    pub fn process_webhook_async(
        &self,
        webhook_id: String,
        payload: PayoutEventPayload,
    ) -> WebhookAcceptedResponse {
        let payouts = self.payouts.clone();
        let outbox = self.outbox.clone();
        let response_id = webhook_id.clone();

        spawn(async move {
            if let Err(e) = Self::apply_event(payouts, outbox, payload).await {
                error!("Webhook processing error for {}: {:?}", webhook_id, e);
            }
        });

        WebhookAcceptedResponse {
            status: "accepted".to_string(),
            webhook_id: response_id,
        }
    }

    async fn apply_event(
        payouts: Arc<PayoutRepository>,
        outbox: Arc<NotificationOutbox>,
        payload: PayoutEventPayload,
    ) -> AppResult<()> {
        validate_event(&payload)?;

        let outcome = match payload.event_type.as_str() {
            "payout.paid" => PayoutStatus::Paid,
            "payout.failed" => PayoutStatus::Failed,
            other => {
                warn!("Ignoring unrecognised payout event type: {}", other);
                return Ok(());
            }
        };

        let settled = payouts
            .settle_by_transfer(&payload.transfer_id, outcome, payload.message.as_deref())
            .await?;

        let request = match settled {
            Some(request) => request,
            None => {
                // Guard rejected the update: either the confirmation was
                // already applied, or the transfer id is unknown here.
                info!(
                    "Payout event for transfer {} already applied or unknown, ignoring",
                    payload.transfer_id
                );
                return Ok(());
            }
        };

        info!(
            "✓ Payout {} settled as {} (transfer {})",
            request.id,
            outcome.as_str(),
            payload.transfer_id
        );

        let (kind, title, body) = match outcome {
            PayoutStatus::Paid => (
                "payout_paid",
                "Payout complete",
                format!("Your payout of {}p has arrived.", request.amount_pence),
            ),
            _ => (
                "payout_failed",
                "Payout failed",
                format!(
                    "Your payout of {}p could not be completed. Please raise a new request.",
                    request.amount_pence
                ),
            ),
        };

        if let Err(e) = outbox
            .enqueue(request.seller_id, kind, title, &body, None)
            .await
        {
            warn!("Failed to queue payout settlement notification: {}", e);
        }

        Ok(())
    }
}

fn validate_event(payload: &PayoutEventPayload) -> AppResult<()> {
    if payload.transfer_id.is_empty() {
        return Err(AppError::BadRequest(
            "Payout event missing transfer id".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(event_type: &str, transfer_id: &str) -> PayoutEventPayload {
        PayoutEventPayload {
            event_type: event_type.to_string(),
            transfer_id: transfer_id.to_string(),
            payout_request_id: None,
            message: None,
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn test_validate_rejects_missing_transfer_id() {
        assert!(validate_event(&payload("payout.paid", "")).is_err());
        assert!(validate_event(&payload("payout.paid", "tr_123")).is_ok());
    }

    #[test]
    fn test_webhook_response_format() {
        let response = WebhookAcceptedResponse {
            status: "accepted".to_string(),
            webhook_id: "evt-123".to_string(),
        };
        assert_eq!(response.status, "accepted");
        assert!(!response.webhook_id.is_empty());
    }
}
