//! Outbound delivery channels.
//!
//! Email sits behind a trait so the provider integration stays a black
//! box (and tests can record sends); the push gateway client is concrete
//! because the wire contract is part of this subsystem.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;

pub mod email;
pub mod push;

pub use email::SmtpEmailClient;
pub use push::{PushDelivery, PushDeliveryStatus, PushGatewayClient};

/// Thin send-templated-email seam. Template rendering and provider
/// specifics live behind the implementation.
#[async_trait]
pub trait EmailDispatch: Send + Sync {
    async fn send(
        &self,
        to_email: &str,
        subject: &str,
        body: &str,
        context: &HashMap<String, String>,
    ) -> Result<()>;
}
