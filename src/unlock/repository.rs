use super::models::UnlockRecord;
use crate::error::{AppError, AppResult, SettlementError};
use sqlx::PgPool;
use uuid::Uuid;

/// Unlock grant store. The unique (buyer, owner, content) constraint is
/// the race guard: the second of two concurrent purchases fails its insert
/// and compensates.
pub struct UnlockRepository {
    pub pool: PgPool,
}

impl UnlockRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn exists(
        &self,
        buyer_id: Uuid,
        owner_id: Uuid,
        content_ref: &str,
    ) -> AppResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM unlocks
                WHERE buyer_id = $1 AND owner_id = $2 AND content_ref = $3
            )
            "#,
        )
        .bind(buyer_id)
        .bind(owner_id)
        .bind(content_ref)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Insert the grant record. A unique-constraint violation maps to
    /// `AlreadyUnlocked` so the purchase flow can compensate and report a
    /// duplicate instead of a generic database error.
    pub async fn create(
        &self,
        id: Uuid,
        buyer_id: Uuid,
        owner_id: Uuid,
        content_ref: &str,
        price: i64,
    ) -> AppResult<UnlockRecord> {
        let record = sqlx::query_as::<_, UnlockRecord>(
            r#"
            INSERT INTO unlocks (id, buyer_id, owner_id, content_ref, price)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, buyer_id, owner_id, content_ref, price, created_at
            "#,
        )
        .bind(id)
        .bind(buyer_id)
        .bind(owner_id)
        .bind(content_ref)
        .bind(price)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.constraint() == Some("unlocks_unique_grant") {
                    return AppError::Settlement(SettlementError::AlreadyUnlocked);
                }
            }
            AppError::Database(e)
        })?;

        Ok(record)
    }

}
