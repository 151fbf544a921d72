// Notification outbox
//
// The settlement engine's only side effect toward the product surface is a
// queued notification row. Delivery (push/email) is a separate consumer;
// Persistence: PostgreSQL with outbox pattern.

use crate::error::AppResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub recipient: Uuid,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
    pub status: String, // "pending", "sent"
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

pub struct NotificationOutbox {
    pool: PgPool,
}

impl NotificationOutbox {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Queue a notification for the external dispatcher.
    pub async fn enqueue(
        &self,
        recipient: Uuid,
        kind: &str,
        title: &str,
        body: &str,
        link: Option<&str>,
    ) -> AppResult<Uuid> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO notifications (id, recipient, kind, title, body, link, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending')
            "#,
        )
        .bind(id)
        .bind(recipient)
        .bind(kind)
        .bind(title)
        .bind(body)
        .bind(link)
        .execute(&self.pool)
        .await?;

        info!("📬 Notification queued: {} ({})", id, kind);
        Ok(id)
    }

    /// Pending notifications, oldest first.
    pub async fn pending(&self, limit: i64) -> AppResult<Vec<NotificationRecord>> {
        let records = sqlx::query_as::<_, NotificationRecord>(
            r#"
            SELECT id, recipient, kind, title, body, link, status, created_at, sent_at
            FROM notifications
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn mark_sent(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE notifications SET status = 'sent', sent_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
