//! Link status state machine.
//!
//! The only edges are pending→approved and pending→rejected; both targets
//! are terminal. The check and the mutation are one conditional UPDATE,
//! so two concurrent callers cannot both win: the loser sees zero
//! affected rows and is folded into idempotent success.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::types::{Category, DomainEvent, LinkStatus, Locale, MonitoringLink, TransitionOutcome};

/// Enforces the monitoring-link state machine over the relational store.
#[derive(Clone)]
pub struct StatusTransitionService {
    pool: SqlitePool,
}

impl StatusTransitionService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a newly detected monitoring hit. Entry point for the
    /// detection collaborator; links always start out pending.
    pub async fn record_hit(&self, url: &str, customer_id: &str) -> Result<MonitoringLink> {
        if url.is_empty() {
            return Err(PipelineError::validation("url", "cannot be empty"));
        }
        if customer_id.is_empty() {
            return Err(PipelineError::validation("customer_id", "cannot be empty"));
        }

        let link = MonitoringLink {
            id: Uuid::new_v4().to_string(),
            url: url.to_string(),
            customer_id: customer_id.to_string(),
            status: LinkStatus::Pending,
            decision_reason: None,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO monitoring_links (id, url, customer_id, status, decision_reason, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&link.id)
        .bind(&link.url)
        .bind(&link.customer_id)
        .bind(link.status)
        .bind(&link.decision_reason)
        .bind(link.created_at)
        .execute(&self.pool)
        .await?;

        debug!(link_id = %link.id, customer_id, "Recorded monitoring hit");
        Ok(link)
    }

    /// Fetch a link by id.
    pub async fn get_link(&self, link_id: &str) -> Result<Option<MonitoringLink>> {
        let link = sqlx::query_as::<_, MonitoringLink>(
            "SELECT id, url, customer_id, status, decision_reason, created_at \
             FROM monitoring_links WHERE id = ?1",
        )
        .bind(link_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(link)
    }

    /// Transition a pending link to a terminal status.
    ///
    /// The write is a single conditional UPDATE scoped to the owning
    /// customer and the pending state. Exactly one caller can win; every
    /// later caller gets `already_terminal = true` and no event, so a
    /// duplicate decision can never double-notify.
    pub async fn transition(
        &self,
        link_id: &str,
        new_status: LinkStatus,
        reason: Option<&str>,
        customer_id: &str,
        locale: Locale,
    ) -> Result<TransitionOutcome> {
        if !new_status.is_terminal() {
            return Err(PipelineError::validation(
                "status",
                "target status must be approved or rejected",
            ));
        }

        let updated = sqlx::query(
            "UPDATE monitoring_links SET status = ?1, decision_reason = ?2 \
             WHERE id = ?3 AND customer_id = ?4 AND status = 'pending'",
        )
        .bind(new_status)
        .bind(reason)
        .bind(link_id)
        .bind(customer_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 1 {
            let link = self
                .get_link(link_id)
                .await?
                .ok_or_else(|| PipelineError::storage("link vanished after update"))?;

            info!(link_id, status = %new_status, "Link transitioned");
            return Ok(TransitionOutcome {
                status: new_status,
                already_terminal: false,
                event: Some(DomainEvent {
                    link_id: link.id,
                    customer_id: link.customer_id,
                    url: link.url,
                    new_status,
                    reason: reason.map(str::to_string),
                    locale,
                    category: Category::Monitoring,
                }),
            });
        }

        // Zero rows: distinguish missing link, foreign link, and a link
        // some earlier (or concurrent) caller already settled.
        let link = self
            .get_link(link_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("monitoring link"))?;

        if link.customer_id != customer_id {
            return Err(PipelineError::permission(
                "link belongs to another customer",
            ));
        }

        if link.status.is_terminal() {
            debug!(link_id, status = %link.status, "Duplicate transition folded into success");
            return Ok(TransitionOutcome {
                status: link.status,
                already_terminal: true,
                event: None,
            });
        }

        // Pending at read time but the conditional write matched nothing:
        // a concurrent writer is mid-flight. Transient, caller may retry.
        Err(PipelineError::storage("conditional update raced, retry"))
    }
}
