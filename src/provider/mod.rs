// Payment provider boundary. The settlement engine only sees this trait;
// the concrete Stripe client lives in `stripe.rs`.

pub mod stripe;

use crate::error::AppResult;
use async_trait::async_trait;

/// State of a seller's external payout destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationStatus {
    pub exists: bool,
    pub payouts_enabled: bool,
}

impl DestinationStatus {
    /// A destination can receive transfers only when it exists and has
    /// completed onboarding.
    pub fn is_ready(&self) -> bool {
        self.exists && self.payouts_enabled
    }
}

/// Outbound transfer request. Amounts are minor units of `currency`.
#[derive(Debug, Clone)]
pub struct TransferRequest<'a> {
    pub amount: i64,
    pub currency: &'a str,
    pub destination: &'a str,
    /// Idempotency key; the payout request id. Re-submitting with the same
    /// key must not create a second transfer.
    pub idempotency_key: &'a str,
    pub reference: &'a str,
}

#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub transfer_id: String,
}

/// External payment provider. Settlement/failure confirmations arrive
/// asynchronously via webhook and are applied by the webhook processor,
/// not through this trait.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Available (not pending) balance in minor units for the currency.
    async fn available_balance(&self, currency: &str) -> AppResult<i64>;

    async fn destination_status(&self, account_id: &str) -> AppResult<DestinationStatus>;

    async fn create_transfer(&self, request: TransferRequest<'_>) -> AppResult<TransferReceipt>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_readiness() {
        let onboarded = DestinationStatus {
            exists: true,
            payouts_enabled: true,
        };
        let pending_onboarding = DestinationStatus {
            exists: true,
            payouts_enabled: false,
        };
        let missing = DestinationStatus {
            exists: false,
            payouts_enabled: false,
        };

        assert!(onboarded.is_ready());
        assert!(!pending_onboarding.is_ready());
        assert!(!missing.is_ready());
    }
}
