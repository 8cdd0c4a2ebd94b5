//! HTTP routes for the notification pipeline:
//! - Link intake and decisions
//! - Notification feed
//! - Device token registry
//! - Preferences
//! - Health endpoint

use crate::handlers::{
    devices_handler, health_handler, links_handler, notifications_handler, preferences_handler,
};
use crate::NotificationPipeline;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

/// Build the main router.
pub fn create_router(pipeline: Arc<NotificationPipeline>, request_timeout: Duration) -> Router {
    let api_router = create_api_router(Arc::clone(&pipeline));
    let health_router = Router::new().route("/health", get(health_handler));

    Router::new()
        .merge(api_router)
        .merge(health_router)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::new(request_timeout))
                .into_inner(),
        )
}

fn create_api_router(pipeline: Arc<NotificationPipeline>) -> Router {
    Router::new()
        // Link endpoints
        .route("/api/v1/links", post(links_handler::record_hit))
        .route("/api/v1/links/:id", get(links_handler::get_link))
        .route("/api/v1/links/:id/decision", post(links_handler::decide))
        // Feed endpoints
        .route(
            "/api/v1/notifications",
            get(notifications_handler::list_notifications),
        )
        .route(
            "/api/v1/notifications/unread-count",
            get(notifications_handler::unread_count),
        )
        .route(
            "/api/v1/notifications/:id/read",
            post(notifications_handler::mark_read),
        )
        // Device token endpoints
        .route("/api/v1/devices", post(devices_handler::register_device))
        .route("/api/v1/devices", delete(devices_handler::sign_out))
        // Preference endpoints
        .route(
            "/api/v1/preferences",
            get(preferences_handler::get_preferences),
        )
        .route(
            "/api/v1/preferences",
            put(preferences_handler::update_preferences),
        )
        .with_state(pipeline)
}
