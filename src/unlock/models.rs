use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

/// Grant record for purchased gated content. Its existence is the commit
/// marker of the unlock transfer: if the attempt failed, no row exists and
/// both ledger sides were compensated back to their pre-attempt values.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UnlockRecord {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub owner_id: Uuid,
    pub content_ref: String,
    pub price: i64,
    pub created_at: DateTime<Utc>,
}
