// Settlement engine: escrow release, payout batches, unlock transfers,
// alert scans. Each routine is a thin struct over the stores, invoked by
// the cron endpoints or the in-process scheduler; all state lives in the
// stores so invocations can overlap safely.

pub mod alerts;
pub mod payouts;
pub mod release;
pub mod scheduler;
pub mod unlock;

use crate::error::AppResult;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

/// Per-invocation batch result. Individual item failures land in `errors`
/// and never abort the rest of the batch.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunSummary {
    pub processed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub errors: Vec<String>,
}

impl RunSummary {
    pub fn record_failure(&mut self, context: impl Into<String>) {
        self.failed += 1;
        self.errors.push(context.into());
    }

    /// Skipped, but loudly: the reason lands in `errors` so the item is
    /// reported rather than silently dropped.
    pub fn record_reported_skip(&mut self, context: impl Into<String>) {
        self.skipped += 1;
        self.errors.push(context.into());
    }
}

/// A settled amount split into the platform's cut and the counterparty's
/// share. `fee + net == total` always.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    pub fee: i64,
    pub net: i64,
}

/// Split `total` at `rate`, rounding the fee half-away-from-zero.
pub fn fee_split(total: i64, rate: Decimal) -> AppResult<FeeSplit> {
    let fee = (Decimal::from(total) * rate)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| {
            crate::error::AppError::Internal(format!("fee overflow for total {}", total))
        })?;

    Ok(FeeSplit {
        fee,
        net: total - fee,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fee_split_ten_percent() {
        let split = fee_split(1_000, dec!(0.10)).unwrap();
        assert_eq!(split.fee, 100);
        assert_eq!(split.net, 900);
    }

    #[test]
    fn test_fee_split_twenty_percent() {
        let split = fee_split(1_000, dec!(0.20)).unwrap();
        assert_eq!(split.fee, 200);
        assert_eq!(split.net, 800);
    }

    #[test]
    fn test_fee_split_rounds_half_away_from_zero() {
        // 25 * 0.10 = 2.5 -> fee 3
        let split = fee_split(25, dec!(0.10)).unwrap();
        assert_eq!(split.fee, 3);
        assert_eq!(split.net, 22);
    }

    #[test]
    fn test_fee_split_conserves_total() {
        for total in [1, 7, 99, 1_000, 123_457] {
            let split = fee_split(total, dec!(0.10)).unwrap();
            assert_eq!(split.fee + split.net, total);
        }
    }

    #[test]
    fn test_zero_rate_means_no_fee() {
        let split = fee_split(500, dec!(0)).unwrap();
        assert_eq!(split.fee, 0);
        assert_eq!(split.net, 500);
    }
}
