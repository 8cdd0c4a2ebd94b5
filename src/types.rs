//! Domain types for the notification pipeline.
//!
//! Status/category/device fields are closed enums stored as snake_case
//! strings, so an invalid state never makes it past deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a monitoring link. `Pending` is the only state with
/// outgoing edges; `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum LinkStatus {
    Pending,
    Approved,
    Rejected,
}

impl LinkStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LinkStatus::Pending)
    }
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Notification category tag, used for preference gating and the feed UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Category {
    Monitoring,
    Removal,
    StatusChange,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Monitoring => write!(f, "monitoring"),
            Self::Removal => write!(f, "removal"),
            Self::StatusChange => write!(f, "status_change"),
        }
    }
}

/// Delivery channels a preference row can gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    InApp,
    Email,
    Push,
}

/// Platform a device token was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum DeviceType {
    Ios,
    Android,
    Web,
}

/// Supported UI locales. Unknown tags fall back to English.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    En,
    Sv,
}

impl Locale {
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "sv" | "sv-se" => Locale::Sv,
            _ => Locale::En,
        }
    }
}

impl Default for Locale {
    fn default() -> Self {
        Locale::En
    }
}

/// A link found by monitoring, owned by a customer. Created by the
/// detection collaborator; mutated only by the transition service.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MonitoringLink {
    pub id: String,
    pub url: String,
    pub customer_id: String,
    pub status: LinkStatus,
    pub decision_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// In-app notification row. Source of truth for unread badge counts.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub category: Category,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// One push token per installed app instance. `token` is globally unique;
/// at most one row per (user, device type) is kept.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeviceToken {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub device_type: DeviceType,
    pub last_updated: DateTime<Utc>,
}

/// Per-user channel/category toggles. Absent rows mean "all enabled".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationPreferences {
    pub user_id: String,
    pub email_monitoring: bool,
    pub email_removal: bool,
    pub email_status_change: bool,
    pub push_enabled: bool,
    pub in_app_enabled: bool,
}

impl NotificationPreferences {
    /// The fail-open defaults used when no row exists yet.
    pub fn default_for(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            email_monitoring: true,
            email_removal: true,
            email_status_change: true,
            push_enabled: true,
            in_app_enabled: true,
        }
    }
}

/// Emitted by a successful status transition; the trigger for fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub link_id: String,
    pub customer_id: String,
    pub url: String,
    pub new_status: LinkStatus,
    pub reason: Option<String>,
    pub locale: Locale,
    pub category: Category,
}

/// Outcome of a single transition call.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub status: LinkStatus,
    /// True when the link had already reached a terminal state before this
    /// call; no event is emitted in that case.
    pub already_terminal: bool,
    #[serde(skip)]
    pub event: Option<DomainEvent>,
}

/// Per-channel delivery outcome for one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum ChannelOutcome {
    Skipped,
    Ok,
    Failed(String),
}

impl ChannelOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, ChannelOutcome::Ok)
    }
}

/// Result of one fan-out. The in-app write succeeded whenever a value of
/// this type exists; email and push are independently best-effort.
#[derive(Debug, Clone, Serialize)]
pub struct FanoutResult {
    pub notification_id: String,
    pub email: ChannelOutcome,
    pub push: ChannelOutcome,
    /// Tokens removed from the registry because the provider reported
    /// them as no longer registered.
    pub pruned_tokens: usize,
}
