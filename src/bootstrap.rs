use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tracing::info;

use crate::{
    api::{handler::AppState, webhook::PayoutWebhookProcessor},
    config::Config,
    error::AppResult,
    escrow::repository::OrderRepository,
    ledger::repository::LedgerRepository,
    notifications::NotificationOutbox,
    payout::repository::PayoutRepository,
    provider::{stripe::StripeProvider, PaymentProvider},
    settlement::{
        alerts::{AlertConfig, AlertScanner},
        payouts::{PayoutConfig, PayoutProcessor},
        release::{EscrowReleaser, ReleaseConfig},
        scheduler::{ScheduleConfig, SettlementScheduler},
        unlock::{UnlockConfig, UnlockService},
    },
    unlock::repository::UnlockRepository,
};

pub async fn initialize_app_state(config: Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    if config.provider_secret_key.is_empty() {
        return Err(crate::error::AppError::Config(
            "PROVIDER_SECRET_KEY must be set".to_string(),
        ));
    }

    let pool = initialize_database(&config.database_url).await?;

    // Stores
    let ledger = Arc::new(LedgerRepository::new(pool.clone()));
    let orders = Arc::new(OrderRepository::new(pool.clone()));
    let payouts = Arc::new(PayoutRepository::new(pool.clone()));
    let unlocks = Arc::new(UnlockRepository::new(pool.clone()));
    let outbox = Arc::new(NotificationOutbox::new(pool.clone()));

    // External payment provider
    let provider: Arc<dyn PaymentProvider> = Arc::new(StripeProvider::new(
        config.provider_secret_key.clone(),
        config.provider_base_url.clone(),
    ));
    info!("✅ Payment provider client initialized ({})", config.provider_base_url);

    // Settlement engine
    let releaser = Arc::new(EscrowReleaser::new(
        orders.clone(),
        ledger.clone(),
        outbox.clone(),
        ReleaseConfig {
            grace: chrono::Duration::days(config.escrow_grace_days),
            fee_rate: config.escrow_fee_rate,
            platform_account: config.platform_account_id,
        },
    ));

    let payout_processor = Arc::new(PayoutProcessor::new(
        payouts.clone(),
        provider.clone(),
        outbox.clone(),
        PayoutConfig {
            currency: config.payout_currency.clone(),
            min_amount: config.min_payout_pence,
        },
    ));

    let alert_scanner = Arc::new(AlertScanner::new(
        payouts.clone(),
        orders.clone(),
        outbox.clone(),
        AlertConfig {
            ops_account: config.platform_account_id,
            ..AlertConfig::default()
        },
    ));

    let unlock_service = Arc::new(UnlockService::new(
        ledger.clone(),
        unlocks.clone(),
        outbox.clone(),
        UnlockConfig {
            fee_rate: config.unlock_fee_rate,
        },
    ));

    let webhook_processor = Arc::new(PayoutWebhookProcessor::new(
        payouts.clone(),
        outbox.clone(),
    ));

    info!(
        "✅ Settlement engine initialized (grace {} days, escrow fee {}, unlock fee {})",
        config.escrow_grace_days, config.escrow_fee_rate, config.unlock_fee_rate
    );

    // Optional in-process cadence; deployments driven purely by external
    // cron leave this disabled.
    if config.scheduler_enabled {
        let scheduler = SettlementScheduler::new(
            ScheduleConfig {
                payout_hour: config.payout_hour_utc,
                release_interval_hours: config.release_interval_hours,
                alerts_interval_hours: config.alerts_interval_hours,
            },
            releaser.clone(),
            payout_processor.clone(),
            alert_scanner.clone(),
        );
        scheduler.start();
    } else {
        info!("Scheduler disabled; settlement runs via cron endpoints only");
    }

    Ok(AppState {
        config: Arc::new(config),
        ledger,
        orders,
        payouts,
        outbox,
        releaser,
        payout_processor,
        alert_scanner,
        unlock_service,
        webhook_processor,
    })
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .connect(database_url)
        .await?;

    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
