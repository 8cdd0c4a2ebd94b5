//! Locale-aware rendering of notification copy.
//!
//! A pure mapping from (status, locale, context) to title/body strings.
//! Template rendering for outbound email bodies lives with the provider;
//! this covers only the in-app and push copy the pipeline itself emits.

use crate::types::{DomainEvent, LinkStatus, Locale};

/// Rendered title and body for one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub title: String,
    pub body: String,
}

/// Render the copy for a link-decision event.
pub fn render_decision(event: &DomainEvent) -> RenderedMessage {
    match (event.new_status, event.locale) {
        (LinkStatus::Approved, Locale::En) => RenderedMessage {
            title: "Removal approved".to_string(),
            body: format!("Your removal request for {} was approved.", event.url),
        },
        (LinkStatus::Approved, Locale::Sv) => RenderedMessage {
            title: "Borttagning godkänd".to_string(),
            body: format!("Din begäran att ta bort {} har godkänts.", event.url),
        },
        (LinkStatus::Rejected, Locale::En) => {
            let mut body = format!("Your removal request for {} was rejected.", event.url);
            if let Some(reason) = &event.reason {
                body.push_str(&format!(" Reason: {reason}"));
            }
            RenderedMessage {
                title: "Removal rejected".to_string(),
                body,
            }
        }
        (LinkStatus::Rejected, Locale::Sv) => {
            let mut body = format!("Din begäran att ta bort {} nekades.", event.url);
            if let Some(reason) = &event.reason {
                body.push_str(&format!(" Anledning: {reason}"));
            }
            RenderedMessage {
                title: "Borttagning nekad".to_string(),
                body,
            }
        }
        // A pending "decision" never reaches fan-out; render something
        // sensible anyway rather than panicking.
        (LinkStatus::Pending, _) => RenderedMessage {
            title: "Removal pending".to_string(),
            body: format!("Your removal request for {} is being reviewed.", event.url),
        },
    }
}
