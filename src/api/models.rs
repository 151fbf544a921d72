use crate::escrow::models::{Order, ReleaseActor};
use crate::unlock::models::UnlockRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Request to unlock gated content for a buyer.
#[derive(Debug, Deserialize, Validate)]
pub struct UnlockRequest {
    pub buyer_id: Uuid,
    pub owner_id: Uuid,
    #[validate(length(min = 1, max = 256))]
    pub content_ref: String,
    #[validate(range(min = 1))]
    pub price: i64,
}

#[derive(Debug, Serialize)]
pub struct UnlockResponse {
    pub unlock_id: Uuid,
    pub buyer_id: Uuid,
    pub owner_id: Uuid,
    pub content_ref: String,
    pub price: i64,
    pub created_at: DateTime<Utc>,
}

impl From<UnlockRecord> for UnlockResponse {
    fn from(record: UnlockRecord) -> Self {
        Self {
            unlock_id: record.id,
            buyer_id: record.buyer_id,
            owner_id: record.owner_id,
            content_ref: record.content_ref,
            price: record.price,
            created_at: record.created_at,
        }
    }
}

/// Reward issuance: the only non-settlement path that may append ledger
/// entries.
#[derive(Debug, Deserialize, Validate)]
pub struct RewardRequest {
    pub account_id: Uuid,
    #[validate(range(min = 1))]
    pub amount: i64,
    #[validate(length(min = 1, max = 64))]
    pub reference_type: String,
    pub reference_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseRequest {
    pub released_by: ReleaseActor,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order_id: Uuid,
    pub status: String,
    pub platform_fee: Option<i64>,
    pub seller_received: Option<i64>,
    pub escrow_released_by: Option<String>,
    pub escrow_released_at: Option<DateTime<Utc>>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.id,
            status: order.status.as_str().to_string(),
            platform_fee: order.platform_fee,
            seller_received: order.seller_received,
            escrow_released_by: order.escrow_released_by.map(|a| a.as_str().to_string()),
            escrow_released_at: order.escrow_released_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub account_id: Uuid,
    pub balance: i64,
}

/// Asynchronous settlement confirmation from the payment provider.
/// Signature verification happens upstream; the payload is applied
/// idempotently by transfer id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutEventPayload {
    /// "payout.paid" or "payout.failed"
    pub event_type: String,
    pub transfer_id: String,
    pub payout_request_id: Option<Uuid>,
    pub message: Option<String>,
    pub timestamp: i64,
}

/// Webhook response - return 202 Accepted immediately
#[derive(Debug, Serialize)]
pub struct WebhookAcceptedResponse {
    pub status: String,
    pub webhook_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlock_request_validation() {
        let valid = UnlockRequest {
            buyer_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            content_ref: "post:123".to_string(),
            price: 1_000,
        };
        assert!(valid.validate().is_ok());

        let zero_price = UnlockRequest {
            buyer_id: valid.buyer_id,
            owner_id: valid.owner_id,
            content_ref: valid.content_ref.clone(),
            price: 0,
        };
        assert!(zero_price.validate().is_err());

        let empty_ref = UnlockRequest {
            buyer_id: valid.buyer_id,
            owner_id: valid.owner_id,
            content_ref: String::new(),
            price: 100,
        };
        assert!(empty_ref.validate().is_err());
    }

    #[test]
    fn test_payout_event_payload_parses() {
        let raw = r#"{
            "event_type": "payout.paid",
            "transfer_id": "tr_123",
            "payout_request_id": null,
            "message": null,
            "timestamp": 1700000000
        }"#;
        let payload: PayoutEventPayload = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.event_type, "payout.paid");
        assert_eq!(payload.transfer_id, "tr_123");
    }

    #[test]
    fn test_release_request_accepts_lowercase_actor() {
        let req: ReleaseRequest = serde_json::from_str(r#"{"released_by":"buyer"}"#).unwrap();
        assert_eq!(req.released_by, ReleaseActor::Buyer);
    }
}
