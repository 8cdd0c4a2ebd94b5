//! Device token registry.
//!
//! Owns the push-token rows. A token value is globally unique and at most
//! one row per (user, device type) survives: re-registrations update in
//! place instead of accumulating stale tokens. Concurrent registrations
//! from the same physical device are last-writer-wins, which matches how
//! the platforms re-issue tokens.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::types::{DeviceToken, DeviceType};

#[derive(Clone)]
pub struct DeviceTokenRegistry {
    pool: SqlitePool,
}

impl DeviceTokenRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register (or refresh) a push token for a user.
    ///
    /// Lookup order matters: the unique token index is consulted first so
    /// a device that moved to a new account is reassigned rather than
    /// colliding on insert.
    pub async fn register(
        &self,
        user_id: &str,
        token: &str,
        device_type: DeviceType,
    ) -> Result<()> {
        if user_id.is_empty() {
            return Err(PipelineError::validation("user_id", "cannot be empty"));
        }
        if token.is_empty() {
            return Err(PipelineError::validation("token", "cannot be empty"));
        }

        let now = Utc::now();

        let existing = sqlx::query_as::<_, DeviceToken>(
            "SELECT id, user_id, token, device_type, last_updated \
             FROM device_tokens WHERE token = ?1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = existing {
            if row.user_id != user_id {
                // Device re-login: the token moved to a new account.
                sqlx::query(
                    "UPDATE device_tokens SET user_id = ?1, last_updated = ?2 WHERE id = ?3",
                )
                .bind(user_id)
                .bind(now)
                .bind(&row.id)
                .execute(&self.pool)
                .await?;
                debug!(token_id = %row.id, "Reassigned device token to new user");
            } else {
                sqlx::query("UPDATE device_tokens SET last_updated = ?1 WHERE id = ?2")
                    .bind(now)
                    .bind(&row.id)
                    .execute(&self.pool)
                    .await?;
            }
            return Ok(());
        }

        // New token value. Reuse the newest row for this (user, device
        // type) if one exists, capping storage at one row per device type.
        let same_device = sqlx::query_as::<_, DeviceToken>(
            "SELECT id, user_id, token, device_type, last_updated \
             FROM device_tokens WHERE user_id = ?1 AND device_type = ?2 \
             ORDER BY last_updated DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(device_type)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = same_device {
            sqlx::query("UPDATE device_tokens SET token = ?1, last_updated = ?2 WHERE id = ?3")
                .bind(token)
                .bind(now)
                .bind(&row.id)
                .execute(&self.pool)
                .await?;
            debug!(token_id = %row.id, "Rotated device token in place");
        } else {
            sqlx::query(
                "INSERT INTO device_tokens (id, user_id, token, device_type, last_updated) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(user_id)
            .bind(token)
            .bind(device_type)
            .bind(now)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    /// All push tokens currently registered for a user.
    pub async fn tokens_for(&self, user_id: &str) -> Result<Vec<String>> {
        let tokens = sqlx::query_scalar::<_, String>(
            "SELECT token FROM device_tokens WHERE user_id = ?1 ORDER BY last_updated DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tokens)
    }

    /// Drop every token for a user. Used on sign-out; callers log a
    /// failure and continue rather than blocking the sign-out itself.
    pub async fn clear_all(&self, user_id: &str) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM device_tokens WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        debug!(user_id, deleted, "Cleared device tokens");
        Ok(deleted)
    }

    /// Remove a single token the provider reported as no longer
    /// registered. Best-effort pruning after a push attempt.
    pub async fn remove_token(&self, token: &str) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM device_tokens WHERE token = ?1")
            .bind(token)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if deleted > 0 {
            warn!("Pruned unregistered push token");
        }
        Ok(deleted > 0)
    }
}
