//! SMTP implementation of the email dispatch seam.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{error, info};

use crate::channels::EmailDispatch;
use crate::config::EmailConfig;
use crate::error::{PipelineError, Result};

/// Email client backed by an async SMTP transport.
#[derive(Clone, Debug)]
pub struct SmtpEmailClient {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_mailbox: Mailbox,
}

impl SmtpEmailClient {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let from_mailbox = format!("{} <{}>", config.from_name, config.from_email)
            .parse::<Mailbox>()
            .map_err(|e| PipelineError::config(format!("invalid from address: {e}")))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| PipelineError::config(format!("cannot create SMTP relay: {e}")))?
            .port(config.smtp_port);

        if !config.smtp_username.is_empty() && !config.smtp_password.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ));
        }

        let transport = builder
            .pool_config(PoolConfig::new().max_size(4))
            .timeout(Some(Duration::from_secs(config.timeout_seconds)))
            .build();

        Ok(Self {
            transport,
            from_mailbox,
        })
    }

    fn build_message(&self, to_email: &str, subject: &str, body: &str) -> Result<Message> {
        let to_mailbox = to_email
            .parse::<Mailbox>()
            .map_err(|e| PipelineError::email(format!("invalid recipient address: {e}")))?;

        let message = Message::builder()
            .from(self.from_mailbox.clone())
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;

        Ok(message)
    }
}

#[async_trait]
impl EmailDispatch for SmtpEmailClient {
    async fn send(
        &self,
        to_email: &str,
        subject: &str,
        body: &str,
        _context: &HashMap<String, String>,
    ) -> Result<()> {
        let message = self.build_message(to_email, subject, body)?;

        match self.transport.send(message).await {
            Ok(_) => {
                info!(to = to_email, "Email dispatched");
                Ok(())
            }
            Err(e) => {
                error!(to = to_email, "Email dispatch failed: {e}");
                Err(e.into())
            }
        }
    }
}
