// Settlement scheduler - in-process cadence for deployments without an
// external cron caller.
//
// Cadence mirrors the HTTP triggers: escrow release every 6 hours, payout
// batch daily at an off-peak hour, alert scan hourly. Overlap with the
// HTTP triggers is tolerated; every mutation behind these jobs is guarded
// by a status check, so a duplicate invocation settles nothing twice.

use crate::settlement::alerts::AlertScanner;
use crate::settlement::payouts::PayoutProcessor;
use crate::settlement::release::EscrowReleaser;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// UTC hour for the daily payout batch (0-23).
    pub payout_hour: u32,
    pub release_interval_hours: u64,
    pub alerts_interval_hours: u64,
}

/// Coordinates the periodic settlement jobs.
pub struct SettlementScheduler {
    config: ScheduleConfig,
    releaser: Arc<EscrowReleaser>,
    payouts: Arc<PayoutProcessor>,
    alerts: Arc<AlertScanner>,
}

impl SettlementScheduler {
    pub fn new(
        config: ScheduleConfig,
        releaser: Arc<EscrowReleaser>,
        payouts: Arc<PayoutProcessor>,
        alerts: Arc<AlertScanner>,
    ) -> Self {
        Self {
            config,
            releaser,
            payouts,
            alerts,
        }
    }

    /// Start the background loops. Handles are returned so a caller can
    /// abort them on shutdown.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let releaser = self.releaser.clone();
        let release_hours = self.config.release_interval_hours.max(1);
        handles.push(tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(release_hours * 3600));
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                match releaser.run().await {
                    Ok(summary) => info!(
                        "Scheduled escrow release: {} processed, {} skipped, {} failed",
                        summary.processed, summary.skipped, summary.failed
                    ),
                    Err(e) => error!("❌ Scheduled escrow release failed: {:?}", e),
                }
            }
        }));

        let alerts = self.alerts.clone();
        let alert_hours = self.config.alerts_interval_hours.max(1);
        handles.push(tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(alert_hours * 3600));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = alerts.run().await {
                    error!("❌ Scheduled alert scan failed: {:?}", e);
                }
            }
        }));

        let payouts = self.payouts.clone();
        let payout_hour = self.config.payout_hour;
        handles.push(tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let next_execution = calculate_next_daily_execution(now, payout_hour);
                let wait = next_execution.signed_duration_since(now);

                if wait.num_seconds() > 0 {
                    info!(
                        "⏰ Next payout batch scheduled for {} UTC",
                        next_execution.format("%H:%M:%S")
                    );
                    tokio::time::sleep(Duration::from_secs(wait.num_seconds() as u64)).await;
                }

                match payouts.run().await {
                    Ok(summary) => info!(
                        "Scheduled payout batch: {} submitted, {} skipped, {} failed",
                        summary.processed, summary.skipped, summary.failed
                    ),
                    Err(e) => error!("❌ Scheduled payout batch failed: {:?}", e),
                }
            }
        }));

        info!("✅ Settlement scheduler started (release/payouts/alerts)");
        handles
    }
}

/// Next occurrence of the given UTC hour, rolling to tomorrow when the
/// hour has already passed today.
fn calculate_next_daily_execution(now: DateTime<Utc>, execution_hour: u32) -> DateTime<Utc> {
    // Clamp so the and_hms_opt calls below cannot fail.
    let hour = execution_hour.min(23);
    let today = now.date_naive().and_hms_opt(hour, 0, 0).unwrap();
    let today_dt = Utc.from_utc_datetime(&today);

    if today_dt <= now {
        let tomorrow = (now.date_naive() + chrono::Duration::days(1))
            .and_hms_opt(hour, 0, 0)
            .unwrap();
        Utc.from_utc_datetime(&tomorrow)
    } else {
        today_dt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_calculate_next_daily_execution() {
        // Current time: 2024-01-01 10:00:00 UTC
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();

        // Execution hour 14:00 is still ahead today
        let next = calculate_next_daily_execution(now, 14);
        assert_eq!(next.hour(), 14);
        assert_eq!(next.day(), 1);

        // Execution hour 09:00 already passed, so tomorrow
        let next = calculate_next_daily_execution(now, 9);
        assert_eq!(next.hour(), 9);
        assert_eq!(next.day(), 2);
    }

    #[test]
    fn test_next_execution_rolls_over_month_end() {
        let now = Utc.with_ymd_and_hms(2024, 1, 31, 23, 30, 0).unwrap();
        let next = calculate_next_daily_execution(now, 2);
        assert_eq!(next.month(), 2);
        assert_eq!(next.day(), 1);
        assert_eq!(next.hour(), 2);
    }
}
