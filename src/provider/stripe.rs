use super::{DestinationStatus, PaymentProvider, TransferReceipt, TransferRequest};
use crate::error::{AppResult, ProviderError};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

/// Stripe Connect client. Form-encoded requests, bearer auth, idempotency
/// keys on transfer creation.
pub struct StripeProvider {
    secret_key: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    available: Vec<BalanceFunds>,
}

#[derive(Debug, Deserialize)]
struct BalanceFunds {
    amount: i64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    id: String,
    #[serde(default)]
    payouts_enabled: bool,
}

#[derive(Debug, Deserialize)]
struct TransferResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl StripeProvider {
    pub fn new(secret_key: String, base_url: String) -> Self {
        Self {
            secret_key,
            base_url,
            client: reqwest::Client::new(),
        }
    }

    async fn decode_error(response: reqwest::Response) -> ProviderError {
        let status = response.status();
        match response.json::<ApiErrorResponse>().await {
            Ok(body) => ProviderError::Transfer {
                code: if body.error.code.is_empty() {
                    status.to_string()
                } else {
                    body.error.code
                },
                message: body.error.message,
            },
            Err(_) => ProviderError::Request(format!("HTTP {}", status)),
        }
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    async fn available_balance(&self, currency: &str) -> AppResult<i64> {
        let response = self
            .client
            .get(format!("{}/v1/balance", self.base_url))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(ProviderError::BalanceUnavailable(format!("HTTP {}", status)).into());
        }

        let balance: BalanceResponse = response.json().await?;
        let amount = balance
            .available
            .iter()
            .find(|funds| funds.currency.eq_ignore_ascii_case(currency))
            .map(|funds| funds.amount)
            .unwrap_or(0);

        Ok(amount)
    }

    async fn destination_status(&self, account_id: &str) -> AppResult<DestinationStatus> {
        let response = self
            .client
            .get(format!("{}/v1/accounts/{}", self.base_url, account_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(DestinationStatus {
                exists: false,
                payouts_enabled: false,
            });
        }

        if !response.status().is_success() {
            return Err(Self::decode_error(response).await.into());
        }

        let account: AccountResponse = response.json().await?;
        Ok(DestinationStatus {
            exists: !account.id.is_empty(),
            payouts_enabled: account.payouts_enabled,
        })
    }

    async fn create_transfer(&self, request: TransferRequest<'_>) -> AppResult<TransferReceipt> {
        let amount = request.amount.to_string();
        let params = [
            ("amount", amount.as_str()),
            ("currency", request.currency),
            ("destination", request.destination),
            ("transfer_group", request.reference),
        ];

        let response = self
            .client
            .post(format!("{}/v1/transfers", self.base_url))
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", request.idempotency_key)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::decode_error(response).await.into());
        }

        let transfer: TransferResponse = response.json().await?;
        info!(
            "💸 Transfer created: {} ({} {} -> {})",
            transfer.id, request.amount, request.currency, request.destination
        );

        Ok(TransferReceipt {
            transfer_id: transfer.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_response_picks_matching_currency() {
        let raw = r#"{"available":[{"amount":250,"currency":"usd"},{"amount":10500,"currency":"gbp"}]}"#;
        let balance: BalanceResponse = serde_json::from_str(raw).unwrap();
        let gbp = balance
            .available
            .iter()
            .find(|funds| funds.currency.eq_ignore_ascii_case("GBP"))
            .map(|funds| funds.amount);
        assert_eq!(gbp, Some(10_500));
    }

    #[test]
    fn test_account_response_defaults_payouts_disabled() {
        let account: AccountResponse = serde_json::from_str(r#"{"id":"acct_123"}"#).unwrap();
        assert!(!account.payouts_enabled);
    }
}
