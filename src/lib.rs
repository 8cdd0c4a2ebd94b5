//! # Privacy Notify
//!
//! Status-transition and notification pipeline for a personal-data
//! removal dashboard:
//! - Monitoring links move `pending -> approved | rejected` exactly once,
//!   guarded by a conditional database update rather than locks
//! - Each successful transition fans out to the in-app feed (durable),
//!   email via SMTP, and push via FCM (both best-effort)
//! - Per-user preferences gate email and push; unknown users fail open
//! - Device tokens are deduplicated per (user, device type) and pruned
//!   when the push provider reports them unregistered
//!
//! ## Usage
//!
//! ```rust,no_run
//! use privacy_notify::{db, NotificationPipeline, PipelineConfig};
//! use privacy_notify::types::{LinkStatus, Locale};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::from_env()?;
//!     let pool = db::connect(&config.database).await?;
//!     db::run_migrations(&pool).await?;
//!
//!     let pipeline = NotificationPipeline::new(pool, &config)?;
//!     let link = pipeline.transitions().record_hit("https://example.com/profile", "cust-1").await?;
//!     let outcome = pipeline
//!         .decide(&link.id, LinkStatus::Approved, None, "cust-1", Locale::En)
//!         .await?;
//!     println!("link is now {}", outcome.status);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{error, info};

pub mod channels;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod fanout;
pub mod feed;
pub mod handlers;
pub mod localize;
pub mod preferences;
pub mod registry;
pub mod routes;
pub mod transitions;
pub mod types;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use fanout::NotificationFanoutOrchestrator;
pub use transitions::StatusTransitionService;
pub use types::{ChannelOutcome, DomainEvent, FanoutResult, TransitionOutcome};

use channels::{EmailDispatch, PushGatewayClient, SmtpEmailClient};
use directory::CustomerDirectory;
use feed::NotificationFeed;
use preferences::PreferenceGate;
use registry::DeviceTokenRegistry;

/// Wires the transition service to the fan-out orchestrator and owns the
/// shared collaborators. One instance serves the whole process.
#[derive(Clone)]
pub struct NotificationPipeline {
    transitions: Arc<StatusTransitionService>,
    fanout: Arc<NotificationFanoutOrchestrator>,
    feed: NotificationFeed,
    preferences: PreferenceGate,
    registry: DeviceTokenRegistry,
    directory: CustomerDirectory,
}

impl NotificationPipeline {
    /// Build the pipeline from a connected pool and channel configuration.
    /// Disabled channels (no SMTP host, no service account) are simply
    /// absent; fan-out records them as skipped.
    pub fn new(pool: SqlitePool, config: &PipelineConfig) -> Result<Self> {
        let email: Option<Arc<dyn EmailDispatch>> = if config.email.enabled {
            Some(Arc::new(SmtpEmailClient::new(&config.email)?))
        } else {
            info!("Email channel disabled, notifications go to feed and push only");
            None
        };

        let push = if config.push.enabled {
            Some(Arc::new(PushGatewayClient::new(config.push.clone())?))
        } else {
            info!("Push channel disabled");
            None
        };

        Ok(Self::with_channels(pool, email, push))
    }

    /// Assemble the pipeline with explicit channel clients. Tests use this
    /// to substitute recording fakes and mock gateways.
    pub fn with_channels(
        pool: SqlitePool,
        email: Option<Arc<dyn EmailDispatch>>,
        push: Option<Arc<PushGatewayClient>>,
    ) -> Self {
        let feed = NotificationFeed::new(pool.clone());
        let preferences = PreferenceGate::new(pool.clone());
        let registry = DeviceTokenRegistry::new(pool.clone());
        let directory = CustomerDirectory::new(pool.clone());

        let fanout = Arc::new(NotificationFanoutOrchestrator::new(
            feed.clone(),
            preferences.clone(),
            registry.clone(),
            directory.clone(),
            email,
            push,
        ));

        Self {
            transitions: Arc::new(StatusTransitionService::new(pool)),
            fanout,
            feed,
            preferences,
            registry,
            directory,
        }
    }

    /// Apply a customer decision to a link and, if it actually changed
    /// state, fan the resulting event out across the channels.
    ///
    /// Channel failures never surface here: once the transition commits,
    /// the caller gets the transition outcome regardless of delivery. The
    /// fan-out result is logged instead.
    pub async fn decide(
        &self,
        link_id: &str,
        new_status: types::LinkStatus,
        reason: Option<&str>,
        customer_id: &str,
        locale: types::Locale,
    ) -> Result<TransitionOutcome> {
        let outcome = self
            .transitions
            .transition(link_id, new_status, reason, customer_id, locale)
            .await?;

        if let Some(event) = &outcome.event {
            match self.fanout.dispatch(event).await {
                Ok(result) => info!(
                    link_id,
                    notification_id = %result.notification_id,
                    "Dispatched decision notifications"
                ),
                Err(e) => error!(link_id, "Notification fan-out failed: {e}"),
            }
        }

        Ok(outcome)
    }

    pub fn transitions(&self) -> &StatusTransitionService {
        &self.transitions
    }

    pub fn fanout(&self) -> &NotificationFanoutOrchestrator {
        &self.fanout
    }

    pub fn feed(&self) -> &NotificationFeed {
        &self.feed
    }

    pub fn preferences(&self) -> &PreferenceGate {
        &self.preferences
    }

    pub fn registry(&self) -> &DeviceTokenRegistry {
        &self.registry
    }

    pub fn directory(&self) -> &CustomerDirectory {
        &self.directory
    }
}
