use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::models::*;
use super::webhook::PayoutWebhookProcessor;
use crate::{
    config::Config,
    error::{AppError, AppResult},
    escrow::{models::ReleaseActor, repository::OrderRepository},
    ledger::{models::EntryType, repository::LedgerRepository},
    notifications::NotificationOutbox,
    payout::repository::PayoutRepository,
    settlement::{
        alerts::AlertScanner, payouts::PayoutProcessor, release::EscrowReleaser,
        unlock::UnlockService, RunSummary,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ledger: Arc<LedgerRepository>,
    pub orders: Arc<OrderRepository>,
    pub payouts: Arc<PayoutRepository>,
    pub outbox: Arc<NotificationOutbox>,
    pub releaser: Arc<EscrowReleaser>,
    pub payout_processor: Arc<PayoutProcessor>,
    pub alert_scanner: Arc<AlertScanner>,
    pub unlock_service: Arc<UnlockService>,
    pub webhook_processor: Arc<PayoutWebhookProcessor>,
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Scheduler triggers share a bearer secret. 401 on mismatch; 200 with the
/// run summary even when individual items failed; 500 only when the whole
/// batch could not start.
fn require_cron_auth(headers: &HeaderMap, secret: &str) -> AppResult<()> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match token {
        Some(token) if !secret.is_empty() && token == secret => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}

/// POST /api/v1/cron/escrow-release (6-hourly cadence)
pub async fn cron_escrow_release(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<RunSummary>> {
    require_cron_auth(&headers, &state.config.cron_secret)?;
    let summary = state.releaser.run().await?;
    Ok(Json(summary))
}

/// POST /api/v1/cron/payouts (daily cadence)
pub async fn cron_payouts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<RunSummary>> {
    require_cron_auth(&headers, &state.config.cron_secret)?;
    let summary = state.payout_processor.run().await?;
    Ok(Json(summary))
}

/// POST /api/v1/cron/alerts (hourly cadence)
pub async fn cron_alerts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<RunSummary>> {
    require_cron_auth(&headers, &state.config.cron_secret)?;
    let summary = state.alert_scanner.run().await?;
    Ok(Json(summary))
}

/// Manual escrow release (seller support action or buyer confirmation).
/// POST /api/v1/orders/:id/release
pub async fn release_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<ReleaseRequest>,
) -> AppResult<Json<OrderResponse>> {
    if request.released_by == ReleaseActor::Auto {
        return Err(AppError::InvalidInput(
            "released_by must be 'manual' or 'buyer'".to_string(),
        ));
    }

    info!(
        "Manual release requested for order {} by {}",
        order_id,
        request.released_by.as_str()
    );

    let order = state
        .releaser
        .release_manual(order_id, request.released_by)
        .await?;
    Ok(Json(OrderResponse::from(order)))
}

/// POST /api/v1/orders/:id/refund
pub async fn refund_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<OrderResponse>> {
    let order = state.releaser.refund(order_id).await?;
    Ok(Json(OrderResponse::from(order)))
}

/// GET /api/v1/orders/:id
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<OrderResponse>> {
    let order = state
        .orders
        .get_order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order not found: {}", order_id)))?;
    Ok(Json(OrderResponse::from(order)))
}

/// GET /api/v1/orders/:id/disputes
pub async fn get_order_disputes(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<Vec<crate::escrow::models::Dispute>>> {
    let disputes = state.orders.disputes_for_order(order_id).await?;
    Ok(Json(disputes))
}

/// Unlock gated content for a buyer.
/// POST /api/v1/unlocks
pub async fn create_unlock(
    State(state): State<AppState>,
    Json(request): Json<UnlockRequest>,
) -> AppResult<Json<UnlockResponse>> {
    request
        .validate()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;

    let record = state
        .unlock_service
        .purchase(
            request.buyer_id,
            request.owner_id,
            &request.content_ref,
            request.price,
        )
        .await?;

    Ok(Json(UnlockResponse::from(record)))
}

/// Issue an XP reward.
/// POST /api/v1/rewards
pub async fn issue_reward(
    State(state): State<AppState>,
    Json(request): Json<RewardRequest>,
) -> AppResult<Json<BalanceResponse>> {
    request
        .validate()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;

    let entry = state
        .ledger
        .append(
            request.account_id,
            request.amount,
            EntryType::Reward,
            &request.reference_type,
            request.reference_id.unwrap_or_else(Uuid::new_v4),
        )
        .await?;

    Ok(Json(BalanceResponse {
        account_id: entry.account_id,
        balance: entry.balance_after,
    }))
}

/// GET /api/v1/ledger/:account_id/balance
///
/// Answers from the ledger sum. The cached projection is checked on the
/// side; a divergence means something wrote it outside the append path.
pub async fn get_balance(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> AppResult<Json<BalanceResponse>> {
    let balance = state.ledger.get_balance(account_id).await?;

    if let Some(cached) = state.ledger.cached_balance(account_id).await? {
        if cached.balance != balance {
            tracing::warn!(
                "⚠️ Cached balance divergence for {}: cached {}, ledger {}",
                account_id,
                cached.balance,
                balance
            );
        }
    }

    Ok(Json(BalanceResponse {
        account_id,
        balance,
    }))
}

/// Ops reconciliation: rebuild the cached projection from the ledger sum.
/// POST /api/v1/ledger/:account_id/recompute
pub async fn recompute_balance(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Json<BalanceResponse>> {
    require_cron_auth(&headers, &state.config.cron_secret)?;
    let balance = state.ledger.recompute_cached_balance(account_id).await?;
    Ok(Json(BalanceResponse {
        account_id,
        balance,
    }))
}

/// GET /api/v1/ledger/:account_id/entries
pub async fn get_ledger_entries(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> AppResult<Json<Vec<crate::ledger::models::LedgerEntry>>> {
    let entries = state.ledger.entries_for_account(account_id, 100).await?;
    Ok(Json(entries))
}

/// GET /api/v1/payouts/:id
pub async fn get_payout(
    State(state): State<AppState>,
    Path(payout_id): Path<Uuid>,
) -> AppResult<Json<crate::payout::models::PayoutRequest>> {
    let request = state
        .payouts
        .get(payout_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Payout request not found: {}", payout_id)))?;
    Ok(Json(request))
}

/// Outbox feed for the external notification dispatcher.
/// GET /api/v1/notifications/pending
pub async fn pending_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<crate::notifications::NotificationRecord>>> {
    require_cron_auth(&headers, &state.config.cron_secret)?;
    let records = state.outbox.pending(100).await?;
    Ok(Json(records))
}

/// Dispatcher acknowledgement after delivery.
/// POST /api/v1/notifications/:id/sent
pub async fn mark_notification_sent(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Json<serde_json::Value>> {
    require_cron_auth(&headers, &state.config.cron_secret)?;
    state.outbox.mark_sent(notification_id).await?;
    Ok(Json(serde_json::json!({ "status": "sent" })))
}

/// Provider settlement webhook. Returns 202 and applies the event in the
/// background.
/// POST /api/v1/webhooks/payments
pub async fn payment_webhook(
    State(state): State<AppState>,
    Json(payload): Json<PayoutEventPayload>,
) -> (StatusCode, Json<WebhookAcceptedResponse>) {
    let webhook_id = Uuid::new_v4().to_string();
    let response = state
        .webhook_processor
        .process_webhook_async(webhook_id, payload);
    (StatusCode::ACCEPTED, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(token: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            headers.insert(
                header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
            );
        }
        headers
    }

    #[test]
    fn test_cron_auth_accepts_matching_secret() {
        assert!(require_cron_auth(&headers_with(Some("s3cret")), "s3cret").is_ok());
    }

    #[test]
    fn test_cron_auth_rejects_bad_or_missing_token() {
        assert!(require_cron_auth(&headers_with(Some("wrong")), "s3cret").is_err());
        assert!(require_cron_auth(&headers_with(None), "s3cret").is_err());
    }

    #[test]
    fn test_cron_auth_rejects_empty_configured_secret() {
        // An unset secret must not mean "allow everything".
        assert!(require_cron_auth(&headers_with(Some("")), "").is_err());
    }
}
