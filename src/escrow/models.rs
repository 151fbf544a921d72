use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Escrow,
    Disputed,
    Completed,
    Refunded,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Escrow => "escrow",
            OrderStatus::Disputed => "disputed",
            OrderStatus::Completed => "completed",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Refunded | OrderStatus::Failed
        )
    }

    /// Valid transitions:
    /// - Escrow → Disputed, Completed, Refunded, Failed
    /// - Disputed → Escrow, Completed, Refunded
    /// - Terminal states (Completed, Refunded, Failed) → no transitions
    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match self {
            OrderStatus::Escrow => matches!(
                to,
                OrderStatus::Disputed
                    | OrderStatus::Completed
                    | OrderStatus::Refunded
                    | OrderStatus::Failed
            ),
            OrderStatus::Disputed => matches!(
                to,
                OrderStatus::Escrow | OrderStatus::Completed | OrderStatus::Refunded
            ),
            OrderStatus::Completed | OrderStatus::Refunded | OrderStatus::Failed => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "order_currency", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderCurrency {
    Xp,
    Gbp,
}

/// Who released the escrow hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "release_actor", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReleaseActor {
    Auto,
    Manual,
    Buyer,
}

impl ReleaseActor {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseActor::Auto => "auto",
            ReleaseActor::Manual => "manual",
            ReleaseActor::Buyer => "buyer",
        }
    }
}

/// Marketplace order with escrowed funds. One currency per order.
///
/// Invariant: once status is Completed or Refunded the order is terminal
/// and no further ledger entries may reference it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub amount: i64,
    pub currency: OrderCurrency,
    pub status: OrderStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub escrow_released_at: Option<DateTime<Utc>>,
    pub escrow_released_by: Option<ReleaseActor>,
    pub platform_fee: Option<i64>,
    pub seller_received: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Whether the delivery grace period has elapsed. Undelivered orders
    /// never qualify.
    pub fn past_grace_period(&self, now: DateTime<Utc>, grace: chrono::Duration) -> bool {
        match self.delivered_at {
            Some(delivered_at) => delivered_at + grace <= now,
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "dispute_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DisputeStatus {
    Open,
    Investigating,
    Resolved,
}

impl DisputeStatus {
    /// Anything short of Resolved blocks escrow release for the order.
    pub fn blocks_release(&self) -> bool {
        !matches!(self, DisputeStatus::Resolved)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Dispute {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: DisputeStatus,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn order(delivered_hours_ago: Option<i64>) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            buyer_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            amount: 1_000,
            currency: OrderCurrency::Xp,
            status: OrderStatus::Escrow,
            delivered_at: delivered_hours_ago.map(|h| now - Duration::hours(h)),
            escrow_released_at: None,
            escrow_released_by: None,
            platform_fee: None,
            seller_received: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_terminal_states_reject_all_transitions() {
        for terminal in [
            OrderStatus::Completed,
            OrderStatus::Refunded,
            OrderStatus::Failed,
        ] {
            assert!(terminal.is_terminal());
            for to in [
                OrderStatus::Escrow,
                OrderStatus::Disputed,
                OrderStatus::Completed,
                OrderStatus::Refunded,
                OrderStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(to));
            }
        }
    }

    #[test]
    fn test_escrow_transitions() {
        assert!(OrderStatus::Escrow.can_transition_to(OrderStatus::Completed));
        assert!(OrderStatus::Escrow.can_transition_to(OrderStatus::Disputed));
        assert!(OrderStatus::Disputed.can_transition_to(OrderStatus::Escrow));
        assert!(!OrderStatus::Disputed.can_transition_to(OrderStatus::Failed));
    }

    #[test]
    fn test_grace_period() {
        let grace = Duration::days(7);
        let now = Utc::now();

        assert!(!order(None).past_grace_period(now, grace));
        assert!(!order(Some(24)).past_grace_period(now, grace));
        assert!(order(Some(24 * 8)).past_grace_period(now, grace));
    }

    #[test]
    fn test_dispute_blocking() {
        assert!(DisputeStatus::Open.blocks_release());
        assert!(DisputeStatus::Investigating.blocks_release());
        assert!(!DisputeStatus::Resolved.blocks_release());
    }
}
