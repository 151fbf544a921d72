// Content unlock - forward-then-compensate transfer
//
// The three writes commit independently:
//   A. debit buyer by the full price        (unlock_spend)
//   B. credit owner with price minus fee    (unlock_earn, best-effort)
//   C. insert the unlock record             (commit marker)
//
// C failing means the attempt failed: A is reversed, and B too if it
// landed, each with a `rollback` entry referencing the unlock id. The
// ledger then nets to zero for the attempt. A rollback entry that itself
// fails is a ledger integrity violation and is logged for manual
// reconciliation; no second-order compensation is attempted.

use crate::error::{AppError, AppResult, SettlementError};
use crate::ledger::models::EntryType;
use crate::ledger::repository::LedgerRepository;
use crate::notifications::NotificationOutbox;
use crate::settlement::fee_split;
use crate::unlock::models::UnlockRecord;
use crate::unlock::repository::UnlockRepository;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct UnlockConfig {
    pub fee_rate: Decimal,
}

/// Reversing ledger writes needed to undo the forward steps that landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compensation {
    CreditBuyer { amount: i64 },
    DebitOwner { amount: i64 },
}

/// What must be reversed given which forward steps committed. The buyer
/// debit (step A) is always first; the owner credit is reversed only if
/// it actually landed.
pub fn compensation_plan(price: i64, earnings: i64, owner_credited: bool) -> Vec<Compensation> {
    let mut plan = vec![Compensation::CreditBuyer { amount: price }];
    if owner_credited {
        plan.push(Compensation::DebitOwner { amount: earnings });
    }
    plan
}

pub struct UnlockService {
    ledger: Arc<LedgerRepository>,
    unlocks: Arc<UnlockRepository>,
    outbox: Arc<NotificationOutbox>,
    config: UnlockConfig,
}

impl UnlockService {
    pub fn new(
        ledger: Arc<LedgerRepository>,
        unlocks: Arc<UnlockRepository>,
        outbox: Arc<NotificationOutbox>,
        config: UnlockConfig,
    ) -> Self {
        Self {
            ledger,
            unlocks,
            outbox,
            config,
        }
    }

    pub async fn purchase(
        &self,
        buyer_id: Uuid,
        owner_id: Uuid,
        content_ref: &str,
        price: i64,
    ) -> AppResult<UnlockRecord> {
        if buyer_id == owner_id {
            return Err(AppError::InvalidInput(
                "Cannot unlock your own content".to_string(),
            ));
        }
        if price <= 0 {
            return Err(AppError::InvalidInput("Price must be positive".to_string()));
        }
        if self.unlocks.exists(buyer_id, owner_id, content_ref).await? {
            return Err(SettlementError::AlreadyUnlocked.into());
        }

        let split = fee_split(price, self.config.fee_rate)?;
        let earnings = split.net;
        let unlock_id = Uuid::new_v4();

        // Step A - the InsufficientFunds guard fires here, before any
        // state has changed.
        self.ledger
            .append(buyer_id, -price, EntryType::UnlockSpend, "unlock", unlock_id)
            .await?;

        // Step B - best-effort. A failure is recorded, not compensated
        // yet; the commit marker decides the attempt's fate.
        let owner_credited = match self
            .ledger
            .append(owner_id, earnings, EntryType::UnlockEarn, "unlock", unlock_id)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                error!(
                    "Owner credit failed for unlock {} (owner {}): {} - flagged for reconciliation",
                    unlock_id, owner_id, e
                );
                false
            }
        };

        // Step C - the commit marker.
        match self
            .unlocks
            .create(unlock_id, buyer_id, owner_id, content_ref, price)
            .await
        {
            Ok(record) => {
                info!(
                    "✓ Unlock {}: buyer {} paid {}, owner {} earned {}",
                    unlock_id, buyer_id, price, owner_id, earnings
                );

                if let Err(e) = self
                    .outbox
                    .enqueue(
                        owner_id,
                        "content_unlocked",
                        "Content unlocked",
                        &format!("Someone unlocked your content and you earned {} XP.", earnings),
                        None,
                    )
                    .await
                {
                    warn!("Failed to queue unlock notification: {}", e);
                }

                Ok(record)
            }
            Err(cause) => {
                self.compensate(unlock_id, buyer_id, owner_id, price, earnings, owner_credited)
                    .await?;
                Err(cause)
            }
        }
    }

    /// Reverse the forward steps. Both balances return to their
    /// pre-attempt values; the ledger keeps the full history (forward
    /// entries plus matching rollbacks), never a silent leak.
    async fn compensate(
        &self,
        unlock_id: Uuid,
        buyer_id: Uuid,
        owner_id: Uuid,
        price: i64,
        earnings: i64,
        owner_credited: bool,
    ) -> AppResult<()> {
        for action in compensation_plan(price, earnings, owner_credited) {
            let (account, amount) = match action {
                Compensation::CreditBuyer { amount } => (buyer_id, amount),
                Compensation::DebitOwner { amount } => (owner_id, -amount),
            };

            if let Err(e) = self
                .ledger
                .append(account, amount, EntryType::Rollback, "unlock", unlock_id)
                .await
            {
                error!(
                    "🚨 RECONCILIATION REQUIRED: rollback of {} for account {} on unlock {} failed: {}",
                    amount, account, unlock_id, e
                );
                return Err(SettlementError::RollbackFailed {
                    reference: "unlock",
                    id: unlock_id,
                    message: e.to_string(),
                }
                .into());
            }
        }

        warn!(
            "Unlock {} rolled back: buyer {} and owner {} restored",
            unlock_id, buyer_id, owner_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Apply forward entries and a compensation plan to in-memory
    /// balances; both parties must end where they started.
    fn net_effect(price: i64, earnings: i64, owner_credited: bool) -> (i64, i64) {
        let mut buyer = 0i64;
        let mut owner = 0i64;

        buyer -= price;
        if owner_credited {
            owner += earnings;
        }

        for action in compensation_plan(price, earnings, owner_credited) {
            match action {
                Compensation::CreditBuyer { amount } => buyer += amount,
                Compensation::DebitOwner { amount } => owner -= amount,
            }
        }

        (buyer, owner)
    }

    #[test]
    fn test_plan_reverses_both_steps_when_owner_credited() {
        let plan = compensation_plan(1_000, 800, true);
        assert_eq!(
            plan,
            vec![
                Compensation::CreditBuyer { amount: 1_000 },
                Compensation::DebitOwner { amount: 800 },
            ]
        );
    }

    #[test]
    fn test_plan_skips_owner_when_credit_never_landed() {
        let plan = compensation_plan(1_000, 800, false);
        assert_eq!(plan, vec![Compensation::CreditBuyer { amount: 1_000 }]);
    }

    #[test]
    fn test_compensation_nets_to_zero() {
        assert_eq!(net_effect(1_000, 800, true), (0, 0));
        assert_eq!(net_effect(1_000, 800, false), (0, 0));
        assert_eq!(net_effect(250, 200, true), (0, 0));
    }
}
