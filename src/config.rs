use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    /// Shared bearer secret for the cron trigger endpoints.
    pub cron_secret: String,
    pub provider_secret_key: String,
    pub provider_base_url: String,
    /// XP account that accrues platform fees from escrow releases.
    pub platform_account_id: Uuid,
    pub escrow_grace_days: i64,
    pub escrow_fee_rate: Decimal,
    pub unlock_fee_rate: Decimal,
    pub min_payout_pence: i64,
    pub payout_currency: String,
    pub scheduler_enabled: bool,
    pub payout_hour_utc: u32,
    pub release_interval_hours: u64,
    pub alerts_interval_hours: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/wavelength".to_string()),
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            cron_secret: std::env::var("CRON_SECRET").map_err(|_| {
                config::ConfigError::Message("CRON_SECRET must be set".to_string())
            })?,
            provider_secret_key: std::env::var("PROVIDER_SECRET_KEY").unwrap_or_default(),
            provider_base_url: std::env::var("PROVIDER_BASE_URL")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            platform_account_id: parse_env("PLATFORM_ACCOUNT_ID", Uuid::nil())?,
            escrow_grace_days: parse_env("ESCROW_GRACE_DAYS", 7)?,
            escrow_fee_rate: parse_env("ESCROW_FEE_RATE", dec!(0.10))?,
            unlock_fee_rate: parse_env("UNLOCK_FEE_RATE", dec!(0.20))?,
            min_payout_pence: parse_env("MIN_PAYOUT_PENCE", 100)?,
            payout_currency: std::env::var("PAYOUT_CURRENCY")
                .unwrap_or_else(|_| "gbp".to_string()),
            scheduler_enabled: parse_env("SCHEDULER_ENABLED", false)?,
            payout_hour_utc: parse_env("PAYOUT_HOUR_UTC", 2)?,
            release_interval_hours: parse_env("RELEASE_INTERVAL_HOURS", 6)?,
            alerts_interval_hours: parse_env("ALERTS_INTERVAL_HOURS", 1)?,
        })
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T, config::ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse::<T>().map_err(|_| {
            config::ConfigError::Message(format!("{} has an invalid value: {}", key, raw))
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_falls_back_to_default() {
        let grace: i64 = parse_env("WAVELENGTH_TEST_UNSET_VAR", 7).unwrap();
        assert_eq!(grace, 7);
    }
}
