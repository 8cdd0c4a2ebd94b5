//! In-app notification feed.
//!
//! The notifications table is the source of truth for unread badge
//! counts. Rows are created by fan-out and marked read by the UI; the
//! read flag only ever moves false→true.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::Result;
use crate::types::Notification;

#[derive(Clone)]
pub struct NotificationFeed {
    pool: SqlitePool,
}

impl NotificationFeed {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a notification row. Must succeed before any outbound
    /// channel is attempted.
    pub async fn insert(&self, notification: &Notification) -> Result<()> {
        sqlx::query(
            "INSERT INTO notifications (id, user_id, title, message, category, read, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&notification.id)
        .bind(&notification.user_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.category)
        .bind(notification.read)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;

        debug!(notification_id = %notification.id, user_id = %notification.user_id, "Stored in-app notification");
        Ok(())
    }

    /// Newest-first page of a user's feed.
    pub async fn list(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Notification>> {
        let rows = sqlx::query_as::<_, Notification>(
            "SELECT id, user_id, title, message, category, read, created_at \
             FROM notifications WHERE user_id = ?1 \
             ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Badge count.
    pub async fn unread_count(&self, user_id: &str) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND read = 0",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Mark one notification read. Scoped to the owner; returns whether a
    /// row changed.
    pub async fn mark_read(&self, notification_id: &str, user_id: &str) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE notifications SET read = 1 WHERE id = ?1 AND user_id = ?2 AND read = 0",
        )
        .bind(notification_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated > 0)
    }

    /// Count of rows for a user, regardless of read state.
    pub async fn count_for(&self, user_id: &str) -> Result<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM notifications WHERE user_id = ?1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
