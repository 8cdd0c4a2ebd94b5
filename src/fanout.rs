//! Notification fan-out.
//!
//! One domain event becomes one durable in-app row plus best-effort
//! email and push attempts. The in-app write is the gate: if it fails
//! the dispatch fails and no channel is attempted. Email and push then
//! run concurrently and fail independently; their outcomes are recorded,
//! logged, and never surfaced to the transition caller.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::channels::{EmailDispatch, PushDeliveryStatus, PushGatewayClient};
use crate::directory::CustomerDirectory;
use crate::error::Result;
use crate::feed::NotificationFeed;
use crate::localize::{render_decision, RenderedMessage};
use crate::preferences::PreferenceGate;
use crate::registry::DeviceTokenRegistry;
use crate::types::{Channel, ChannelOutcome, DomainEvent, FanoutResult, Notification};

pub struct NotificationFanoutOrchestrator {
    feed: NotificationFeed,
    preferences: PreferenceGate,
    registry: DeviceTokenRegistry,
    directory: CustomerDirectory,
    email: Option<Arc<dyn EmailDispatch>>,
    push: Option<Arc<PushGatewayClient>>,
}

impl NotificationFanoutOrchestrator {
    pub fn new(
        feed: NotificationFeed,
        preferences: PreferenceGate,
        registry: DeviceTokenRegistry,
        directory: CustomerDirectory,
        email: Option<Arc<dyn EmailDispatch>>,
        push: Option<Arc<PushGatewayClient>>,
    ) -> Self {
        Self {
            feed,
            preferences,
            registry,
            directory,
            email,
            push,
        }
    }

    /// Fan one event out across the three channels.
    ///
    /// Returns `Err` only when the in-app row could not be persisted;
    /// with nothing durable to notify about, the outbound channels are
    /// not attempted. Once the row is committed it stays committed no
    /// matter what the channels do.
    pub async fn dispatch(&self, event: &DomainEvent) -> Result<FanoutResult> {
        let rendered = render_decision(event);

        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            user_id: event.customer_id.clone(),
            title: rendered.title.clone(),
            message: rendered.body.clone(),
            category: event.category,
            read: false,
            created_at: Utc::now(),
        };
        self.feed.insert(&notification).await?;

        let (email, (push, pruned_tokens)) = tokio::join!(
            self.attempt_email(event, &rendered),
            self.attempt_push(event, &rendered),
        );

        info!(
            link_id = %event.link_id,
            notification_id = %notification.id,
            email = ?email,
            push = ?push,
            "Fan-out complete"
        );

        Ok(FanoutResult {
            notification_id: notification.id,
            email,
            push,
            pruned_tokens,
        })
    }

    async fn attempt_email(
        &self,
        event: &DomainEvent,
        rendered: &RenderedMessage,
    ) -> ChannelOutcome {
        let Some(client) = &self.email else {
            return ChannelOutcome::Skipped;
        };

        let enabled = match self
            .preferences
            .is_enabled(&event.customer_id, Channel::Email, event.category)
            .await
        {
            Ok(enabled) => enabled,
            Err(e) => {
                warn!(customer_id = %event.customer_id, "Email preference lookup failed: {e}");
                return ChannelOutcome::Failed(e.to_string());
            }
        };
        if !enabled {
            return ChannelOutcome::Skipped;
        }

        let to_email = match self.directory.email_for(&event.customer_id).await {
            Ok(Some(address)) => address,
            Ok(None) => {
                warn!(customer_id = %event.customer_id, "No email address on file, skipping email");
                return ChannelOutcome::Skipped;
            }
            Err(e) => return ChannelOutcome::Failed(e.to_string()),
        };

        let context = HashMap::from([
            ("link_id".to_string(), event.link_id.clone()),
            ("url".to_string(), event.url.clone()),
            ("status".to_string(), event.new_status.to_string()),
            ("category".to_string(), event.category.to_string()),
        ]);

        match client
            .send(&to_email, &rendered.title, &rendered.body, &context)
            .await
        {
            Ok(()) => ChannelOutcome::Ok,
            Err(e) => {
                warn!(customer_id = %event.customer_id, "Email channel failed: {e}");
                ChannelOutcome::Failed(e.to_string())
            }
        }
    }

    async fn attempt_push(
        &self,
        event: &DomainEvent,
        rendered: &RenderedMessage,
    ) -> (ChannelOutcome, usize) {
        let Some(client) = &self.push else {
            return (ChannelOutcome::Skipped, 0);
        };

        let enabled = match self
            .preferences
            .is_enabled(&event.customer_id, Channel::Push, event.category)
            .await
        {
            Ok(enabled) => enabled,
            Err(e) => {
                warn!(customer_id = %event.customer_id, "Push preference lookup failed: {e}");
                return (ChannelOutcome::Failed(e.to_string()), 0);
            }
        };
        if !enabled {
            return (ChannelOutcome::Skipped, 0);
        }

        let tokens = match self.registry.tokens_for(&event.customer_id).await {
            Ok(tokens) => tokens,
            Err(e) => return (ChannelOutcome::Failed(e.to_string()), 0),
        };
        if tokens.is_empty() {
            return (ChannelOutcome::Skipped, 0);
        }

        let data = HashMap::from([
            ("link_id".to_string(), event.link_id.clone()),
            ("status".to_string(), event.new_status.to_string()),
            ("category".to_string(), event.category.to_string()),
        ]);

        let deliveries = match client
            .send(&tokens, &rendered.title, &rendered.body, &data)
            .await
        {
            Ok(deliveries) => deliveries,
            Err(e) => {
                warn!(customer_id = %event.customer_id, "Push channel failed: {e}");
                return (ChannelOutcome::Failed(e.to_string()), 0);
            }
        };

        // Prune tokens the provider says are gone; best-effort.
        let mut pruned = 0;
        for delivery in &deliveries {
            if delivery.status == PushDeliveryStatus::Unregistered {
                match self.registry.remove_token(&delivery.token).await {
                    Ok(true) => pruned += 1,
                    Ok(false) => {}
                    Err(e) => warn!("Failed to prune unregistered token: {e}"),
                }
            }
        }

        let delivered = deliveries
            .iter()
            .filter(|d| d.status == PushDeliveryStatus::Delivered)
            .count();

        let outcome = if delivered > 0 {
            ChannelOutcome::Ok
        } else {
            let detail = deliveries
                .iter()
                .find_map(|d| d.detail.clone())
                .unwrap_or_else(|| "no token accepted the message".to_string());
            ChannelOutcome::Failed(detail)
        };

        (outcome, pruned)
    }
}
