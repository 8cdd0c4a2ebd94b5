//! Request handlers for the notification pipeline API:
//! - Link intake and customer decisions
//! - Notification feed (list, unread count, mark read)
//! - Device token registration and sign-out
//! - Preference management
//! - Health endpoint

use crate::error::{PipelineError, Result};
use crate::types::{DeviceType, LinkStatus, Locale, NotificationPreferences};
use crate::NotificationPipeline;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

pub mod links_handler {
    use super::*;

    #[derive(Deserialize)]
    pub struct RecordHitRequest {
        pub url: String,
        pub customer_id: String,
    }

    #[derive(Deserialize)]
    pub struct DecisionRequest {
        pub decision: LinkStatus,
        pub reason: Option<String>,
        pub customer_id: String,
        pub locale: Option<String>,
    }

    /// Record a link found by monitoring. Links always start out pending.
    pub async fn record_hit(
        State(pipeline): State<Arc<NotificationPipeline>>,
        Json(request): Json<RecordHitRequest>,
    ) -> Result<impl IntoResponse> {
        info!("Recording monitoring hit for customer: {}", request.customer_id);

        let link = pipeline
            .transitions()
            .record_hit(&request.url, &request.customer_id)
            .await?;
        Ok((StatusCode::CREATED, Json(link)))
    }

    /// Get a link by ID.
    pub async fn get_link(
        State(pipeline): State<Arc<NotificationPipeline>>,
        Path(id): Path<String>,
    ) -> Result<impl IntoResponse> {
        match pipeline.transitions().get_link(&id).await? {
            Some(link) => Ok(Json(link)),
            None => Err(PipelineError::not_found("link")),
        }
    }

    /// Apply a customer decision (approve/reject) to a pending link.
    /// Notifications fan out after the transition commits; their outcome
    /// never changes the response.
    pub async fn decide(
        State(pipeline): State<Arc<NotificationPipeline>>,
        Path(id): Path<String>,
        Json(request): Json<DecisionRequest>,
    ) -> Result<impl IntoResponse> {
        info!("Applying decision {} to link: {}", request.decision, id);

        let locale = request
            .locale
            .as_deref()
            .map(Locale::from_tag)
            .unwrap_or_default();

        match pipeline
            .decide(
                &id,
                request.decision,
                request.reason.as_deref(),
                &request.customer_id,
                locale,
            )
            .await
        {
            Ok(outcome) => Ok(Json(outcome)),
            Err(e) => {
                error!("Decision on link {} failed: {}", id, e);
                Err(e)
            }
        }
    }
}

pub mod notifications_handler {
    use super::*;

    #[derive(Deserialize)]
    pub struct FeedQuery {
        pub user_id: String,
        pub limit: Option<u32>,
        pub offset: Option<u32>,
    }

    #[derive(Deserialize)]
    pub struct UserQuery {
        pub user_id: String,
    }

    #[derive(Deserialize)]
    pub struct MarkReadRequest {
        pub user_id: String,
    }

    /// List a user's notifications, newest first.
    pub async fn list_notifications(
        State(pipeline): State<Arc<NotificationPipeline>>,
        Query(query): Query<FeedQuery>,
    ) -> Result<impl IntoResponse> {
        let notifications = pipeline
            .feed()
            .list(
                &query.user_id,
                query.limit.unwrap_or(50),
                query.offset.unwrap_or(0),
            )
            .await?;
        Ok(Json(notifications))
    }

    /// Unread badge count for a user.
    pub async fn unread_count(
        State(pipeline): State<Arc<NotificationPipeline>>,
        Query(query): Query<UserQuery>,
    ) -> Result<impl IntoResponse> {
        let count = pipeline.feed().unread_count(&query.user_id).await?;
        Ok(Json(serde_json::json!({ "unread": count })))
    }

    /// Mark one notification read. Owner-scoped; marking an already-read
    /// notification is a no-op reported as not found.
    pub async fn mark_read(
        State(pipeline): State<Arc<NotificationPipeline>>,
        Path(id): Path<String>,
        Json(request): Json<MarkReadRequest>,
    ) -> Result<impl IntoResponse> {
        match pipeline.feed().mark_read(&id, &request.user_id).await? {
            true => Ok(StatusCode::NO_CONTENT),
            false => Err(PipelineError::not_found("notification")),
        }
    }
}

pub mod devices_handler {
    use super::*;

    #[derive(Deserialize)]
    pub struct RegisterDeviceRequest {
        pub user_id: String,
        pub token: String,
        pub device_type: DeviceType,
    }

    #[derive(Deserialize)]
    pub struct SignOutQuery {
        pub user_id: String,
    }

    /// Register (or refresh) a push token for a user's device.
    pub async fn register_device(
        State(pipeline): State<Arc<NotificationPipeline>>,
        Json(request): Json<RegisterDeviceRequest>,
    ) -> Result<impl IntoResponse> {
        info!("Registering device token for user: {}", request.user_id);

        pipeline
            .registry()
            .register(&request.user_id, &request.token, request.device_type)
            .await?;
        Ok(StatusCode::NO_CONTENT)
    }

    /// Drop all of a user's push tokens on sign-out. Sign-out must not
    /// fail because of token cleanup, so storage errors are logged and
    /// the call still succeeds.
    pub async fn sign_out(
        State(pipeline): State<Arc<NotificationPipeline>>,
        Query(query): Query<SignOutQuery>,
    ) -> impl IntoResponse {
        match pipeline.registry().clear_all(&query.user_id).await {
            Ok(deleted) => {
                info!("Cleared {} device tokens for user: {}", deleted, query.user_id);
            }
            Err(e) => {
                error!(
                    "Failed to clear device tokens for user {}: {}",
                    query.user_id, e
                );
            }
        }
        StatusCode::NO_CONTENT
    }
}

pub mod preferences_handler {
    use super::*;

    #[derive(Deserialize)]
    pub struct UserQuery {
        pub user_id: String,
    }

    /// Fetch a user's preferences, materializing the all-enabled default
    /// row on first read.
    pub async fn get_preferences(
        State(pipeline): State<Arc<NotificationPipeline>>,
        Query(query): Query<UserQuery>,
    ) -> Result<impl IntoResponse> {
        let prefs = pipeline.preferences().get_or_default(&query.user_id).await?;
        Ok(Json(prefs))
    }

    /// Replace a user's preferences.
    pub async fn update_preferences(
        State(pipeline): State<Arc<NotificationPipeline>>,
        Json(prefs): Json<NotificationPreferences>,
    ) -> Result<impl IntoResponse> {
        if prefs.user_id.is_empty() {
            return Err(PipelineError::validation("user_id", "cannot be empty"));
        }

        pipeline.preferences().update(&prefs).await?;
        Ok(Json(prefs))
    }
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "privacy-notify",
        "status": "healthy",
        "timestamp": chrono::Utc::now(),
    }))
}
