//! Push gateway client.
//!
//! Signs an RS256 OAuth2 assertion with the service-account key,
//! exchanges it for a bearer token at the token endpoint, and delivers
//! one message per device token through the FCM v1 send endpoint. The
//! bearer token is cached in process memory and refreshed once fewer
//! than five minutes remain before expiry.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::PushConfig;
use crate::error::{PipelineError, Result};

const MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECONDS: i64 = 3600;
const REFRESH_MARGIN_SECONDS: i64 = 300;

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now > ChronoDuration::seconds(REFRESH_MARGIN_SECONDS)
    }
}

/// Delivery outcome for a single device token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushDeliveryStatus {
    Delivered,
    /// The provider no longer knows this token; safe to prune.
    Unregistered,
    Failed {
        retryable: bool,
    },
}

#[derive(Debug, Clone)]
pub struct PushDelivery {
    pub token: String,
    pub status: PushDeliveryStatus,
    pub detail: Option<String>,
}

pub struct PushGatewayClient {
    config: PushConfig,
    http: reqwest::Client,
    signing_key: EncodingKey,
    cache: RwLock<Option<CachedToken>>,
}

impl std::fmt::Debug for PushGatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushGatewayClient")
            .field("config", &self.config)
            .field("http", &self.http)
            .finish_non_exhaustive()
    }
}

impl PushGatewayClient {
    pub fn new(config: PushConfig) -> Result<Self> {
        let signing_key = EncodingKey::from_rsa_pem(config.private_key_pem.as_bytes())
            .map_err(|e| {
                PipelineError::config(format!("service-account private key is not valid: {e}"))
            })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            config,
            http,
            signing_key,
            cache: RwLock::new(None),
        })
    }

    /// Deliver one message per token. Tokens fail independently: a
    /// rejected token never aborts the loop. Only an OAuth failure,
    /// which poisons every token alike, errors the whole call.
    pub async fn send(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: &HashMap<String, String>,
    ) -> Result<Vec<PushDelivery>> {
        if tokens.is_empty() {
            return Err(PipelineError::validation("tokens", "cannot be empty"));
        }

        let access_token = self.access_token().await?;
        let url = format!(
            "{}/v1/projects/{}/messages:send",
            self.config.api_base, self.config.project_id
        );

        let mut deliveries = Vec::with_capacity(tokens.len());
        for token in tokens {
            let payload = json!({
                "message": {
                    "token": token,
                    "notification": { "title": title, "body": body },
                    "data": data,
                    "android": { "notification": { "sound": "default" } },
                    "apns": { "payload": { "aps": { "sound": "default" } } }
                }
            });

            let delivery = match self
                .http
                .post(&url)
                .bearer_auth(&access_token)
                .json(&payload)
                .send()
                .await
            {
                Ok(response) => Self::classify_response(token, response).await,
                Err(e) => {
                    warn!(error = %e, "Push send failed before a response arrived");
                    PushDelivery {
                        token: token.clone(),
                        status: PushDeliveryStatus::Failed { retryable: true },
                        detail: Some(e.to_string()),
                    }
                }
            };
            deliveries.push(delivery);
        }

        Ok(deliveries)
    }

    async fn classify_response(token: &str, response: reqwest::Response) -> PushDelivery {
        let status = response.status();
        if status.is_success() {
            return PushDelivery {
                token: token.to_string(),
                status: PushDeliveryStatus::Delivered,
                detail: None,
            };
        }

        let body = response.text().await.unwrap_or_default();
        let unregistered = status == reqwest::StatusCode::NOT_FOUND
            || (status == reqwest::StatusCode::BAD_REQUEST && body.contains("UNREGISTERED"));

        let delivery_status = if unregistered {
            PushDeliveryStatus::Unregistered
        } else {
            PushDeliveryStatus::Failed {
                retryable: status.is_server_error()
                    || status == reqwest::StatusCode::TOO_MANY_REQUESTS,
            }
        };

        warn!(%status, "Push provider rejected message for one token");
        PushDelivery {
            token: token.to_string(),
            status: delivery_status,
            detail: Some(body),
        }
    }

    /// Current bearer token, from cache when it has comfortably more than
    /// the refresh margin left, otherwise freshly exchanged.
    async fn access_token(&self) -> Result<String> {
        let now = Utc::now();
        if let Some(cached) = self.cache.read().await.as_ref() {
            if cached.is_fresh(now) {
                return Ok(cached.value.clone());
            }
        }

        let mut guard = self.cache.write().await;
        // Another task may have refreshed while we waited on the lock.
        if let Some(cached) = guard.as_ref() {
            if cached.is_fresh(now) {
                return Ok(cached.value.clone());
            }
        }

        let token = self.exchange_assertion().await?;
        let value = token.access_token.clone();
        *guard = Some(CachedToken {
            value: token.access_token,
            expires_at: now + ChronoDuration::seconds(token.expires_in),
        });
        debug!("Acquired push gateway access token");
        Ok(value)
    }

    async fn exchange_assertion(&self) -> Result<TokenResponse> {
        let assertion = self.sign_assertion()?;

        let response = self
            .http
            .post(&self.config.token_endpoint)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)])
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::auth(format!(
                "token endpoint rejected assertion ({status}): {body}"
            )));
        }
        if !status.is_success() {
            return Err(PipelineError::push(format!(
                "token endpoint returned {status}"
            )));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| PipelineError::auth(format!("malformed token response: {e}")))?;
        Ok(token)
    }

    fn sign_assertion(&self) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.config.service_account_email,
            scope: MESSAGING_SCOPE,
            aud: &self.config.token_endpoint,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECONDS,
        };

        let jwt = encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)?;
        Ok(jwt)
    }
}
