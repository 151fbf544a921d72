use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    api::handler::{
        create_unlock, cron_alerts, cron_escrow_release, cron_payouts, get_balance,
        get_ledger_entries, get_order, get_order_disputes, get_payout, health_check, issue_reward,
        mark_notification_sent, payment_webhook, pending_notifications, recompute_balance,
        refund_order, release_order, AppState,
    },
    middleware::{create_cors_layer, rate_limit_middleware, ApiRateLimiter},
};

pub async fn create_app(state: AppState) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let rate_limiter = Arc::new(ApiRateLimiter::new(100, 60));

    // User-facing mutations sit behind the rate limiter; cron triggers and
    // webhooks authenticate separately and do not.
    let user_routes = Router::new()
        .route("/unlocks", post(create_unlock))
        .route("/rewards", post(issue_reward))
        .route("/orders/:id/release", post(release_order))
        .route("/orders/:id/refund", post(refund_order))
        .layer(from_fn_with_state(rate_limiter, rate_limit_middleware));

    let app = Router::new()
        .route("/health", get(health_check))
        .nest(
            "/api/v1",
            Router::new()
                .merge(user_routes)
                // Read projections
                .route("/orders/:id", get(get_order))
                .route("/orders/:id/disputes", get(get_order_disputes))
                .route("/ledger/:account_id/balance", get(get_balance))
                .route("/ledger/:account_id/entries", get(get_ledger_entries))
                .route("/payouts/:id", get(get_payout))
                // Provider webhook
                .route("/webhooks/payments", post(payment_webhook))
                // Ops surface (shared bearer secret)
                .route("/ledger/:account_id/recompute", post(recompute_balance))
                .route("/notifications/pending", get(pending_notifications))
                .route("/notifications/:id/sent", post(mark_notification_sent))
                // Scheduler triggers (shared bearer secret)
                .route("/cron/escrow-release", post(cron_escrow_release))
                .route("/cron/payouts", post(cron_payouts))
                .route("/cron/alerts", post(cron_alerts)),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(create_cors_layer()),
        )
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

pub async fn run_server(app: Router, bind_address: &str) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}
