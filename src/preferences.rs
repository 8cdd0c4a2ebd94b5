//! Per-user delivery preferences.
//!
//! Missing rows fail open: every channel counts as enabled, and a
//! default-enabled row is created lazily so later reads are plain
//! primary-key lookups.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::Result;
use crate::types::{Category, Channel, NotificationPreferences};

#[derive(Clone)]
pub struct PreferenceGate {
    pool: SqlitePool,
}

impl PreferenceGate {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Resolve whether a (channel, category) pair is enabled for a user.
    pub async fn is_enabled(
        &self,
        user_id: &str,
        channel: Channel,
        category: Category,
    ) -> Result<bool> {
        let prefs = self.get_or_default(user_id).await?;
        Ok(match channel {
            Channel::InApp => prefs.in_app_enabled,
            Channel::Push => prefs.push_enabled,
            Channel::Email => match category {
                Category::Monitoring => prefs.email_monitoring,
                Category::Removal => prefs.email_removal,
                Category::StatusChange => prefs.email_status_change,
            },
        })
    }

    /// Fetch the preference row, materialising the default-enabled row on
    /// first read.
    pub async fn get_or_default(&self, user_id: &str) -> Result<NotificationPreferences> {
        if let Some(prefs) = self.fetch(user_id).await? {
            return Ok(prefs);
        }

        let defaults = NotificationPreferences::default_for(user_id);
        // OR IGNORE: a concurrent first read may have inserted already.
        sqlx::query(
            "INSERT OR IGNORE INTO notification_preferences \
             (user_id, email_monitoring, email_removal, email_status_change, push_enabled, in_app_enabled) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&defaults.user_id)
        .bind(defaults.email_monitoring)
        .bind(defaults.email_removal)
        .bind(defaults.email_status_change)
        .bind(defaults.push_enabled)
        .bind(defaults.in_app_enabled)
        .execute(&self.pool)
        .await?;

        debug!(user_id, "Created default notification preferences");
        Ok(defaults)
    }

    /// Replace a user's preference row (settings screen save).
    pub async fn update(&self, prefs: &NotificationPreferences) -> Result<()> {
        sqlx::query(
            "INSERT INTO notification_preferences \
             (user_id, email_monitoring, email_removal, email_status_change, push_enabled, in_app_enabled) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT (user_id) DO UPDATE SET \
             email_monitoring = excluded.email_monitoring, \
             email_removal = excluded.email_removal, \
             email_status_change = excluded.email_status_change, \
             push_enabled = excluded.push_enabled, \
             in_app_enabled = excluded.in_app_enabled",
        )
        .bind(&prefs.user_id)
        .bind(prefs.email_monitoring)
        .bind(prefs.email_removal)
        .bind(prefs.email_status_change)
        .bind(prefs.push_enabled)
        .bind(prefs.in_app_enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch(&self, user_id: &str) -> Result<Option<NotificationPreferences>> {
        let prefs = sqlx::query_as::<_, NotificationPreferences>(
            "SELECT user_id, email_monitoring, email_removal, email_status_change, push_enabled, in_app_enabled \
             FROM notification_preferences WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(prefs)
    }
}
