use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};
use std::fmt;
use uuid::Uuid;

/// What caused a ledger entry. The set is closed: settlement routines and
/// reward issuers are the only writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "xp_entry_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Reward,
    EscrowRelease,
    PlatformFee,
    UnlockSpend,
    UnlockEarn,
    Rollback,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Reward => "reward",
            EntryType::EscrowRelease => "escrow_release",
            EntryType::PlatformFee => "platform_fee",
            EntryType::UnlockSpend => "unlock_spend",
            EntryType::UnlockEarn => "unlock_earn",
            EntryType::Rollback => "rollback",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable ledger record. Amount is signed: positive credits, negative
/// debits. `balance_after` snapshots the account balance the moment the
/// entry committed.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: i64,
    pub entry_type: EntryType,
    pub reference_type: String,
    pub reference_id: Uuid,
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

/// Cached balance projection. Never written outside the transaction that
/// appends the corresponding ledger entries; the ledger sum is the source
/// of truth.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct XpAccount {
    pub account_id: Uuid,
    pub balance: i64,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_type_round_trip() {
        assert_eq!(EntryType::EscrowRelease.as_str(), "escrow_release");
        assert_eq!(EntryType::Rollback.to_string(), "rollback");
    }

    #[test]
    fn test_entry_type_serde_uses_snake_case() {
        let json = serde_json::to_string(&EntryType::UnlockSpend).unwrap();
        assert_eq!(json, "\"unlock_spend\"");
    }
}
