use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "payout_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    InTransit,
    Paid,
    Failed,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::InTransit => "in_transit",
            PayoutStatus::Paid => "paid",
            PayoutStatus::Failed => "failed",
        }
    }

    /// Valid transitions:
    /// - Pending → InTransit, Failed
    /// - InTransit → Paid, Failed
    /// - Paid, Failed → no transitions
    pub fn can_transition_to(&self, to: PayoutStatus) -> bool {
        match self {
            PayoutStatus::Pending => matches!(to, PayoutStatus::InTransit | PayoutStatus::Failed),
            PayoutStatus::InTransit => matches!(to, PayoutStatus::Paid | PayoutStatus::Failed),
            PayoutStatus::Paid | PayoutStatus::Failed => false,
        }
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Seller withdrawal request. Amounts are GBP minor units (pence).
///
/// Invariant: a request moves `pending → in_transit` at most once; the
/// request id doubles as the provider idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PayoutRequest {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub amount_pence: i64,
    pub status: PayoutStatus,
    pub transfer_id: Option<String>,
    pub destination_account: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Why the payout batch left a request untouched this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    SellerNotOnboarded,
    BelowMinimum,
    InsufficientLiquidity,
    AlreadySubmitted,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::SellerNotOnboarded => "seller_not_onboarded",
            SkipReason::BelowMinimum => "below_minimum",
            SkipReason::InsufficientLiquidity => "insufficient_liquidity",
            SkipReason::AlreadySubmitted => "already_submitted",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_moves_to_in_transit_at_most_once() {
        assert!(PayoutStatus::Pending.can_transition_to(PayoutStatus::InTransit));
        // Once in transit, the only legal moves are the webhook outcomes.
        assert!(!PayoutStatus::InTransit.can_transition_to(PayoutStatus::InTransit));
        assert!(PayoutStatus::InTransit.can_transition_to(PayoutStatus::Paid));
        assert!(PayoutStatus::InTransit.can_transition_to(PayoutStatus::Failed));
    }

    #[test]
    fn test_terminal_payout_states() {
        for terminal in [PayoutStatus::Paid, PayoutStatus::Failed] {
            for to in [
                PayoutStatus::Pending,
                PayoutStatus::InTransit,
                PayoutStatus::Paid,
                PayoutStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(to));
            }
        }
    }
}
