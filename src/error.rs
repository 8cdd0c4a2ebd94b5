//! Error handling for the notification pipeline
//!
//! One crate-wide error enum covering the transition state machine, the
//! relational store, and both outbound channels, with utilities for HTTP
//! mapping and retry classification.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for the notification pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Missing or malformed input, rejected before any network call
    #[error("Validation error: {field}: {message}")]
    Validation { field: String, message: String },

    /// Unknown link or record id
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    /// Caller lacks rights on the target row; distinct from storage
    /// failures so operators can tell policy from breakage
    #[error("Permission denied: {message}")]
    Permission { message: String },

    /// Transient relational-store errors, safe for the caller to retry
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Email channel delivery errors
    #[error("Email error: {message}")]
    Email { message: String },

    /// Push channel delivery errors
    #[error("Push error: {message}")]
    Push { message: String },

    /// The OAuth assertion was rejected by the token endpoint. A
    /// configuration fault affecting every token in the send.
    #[error("Push auth error: {message}")]
    Auth { message: String },

    /// A bounded outbound call did not complete in time
    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    /// Network/connection errors on outbound calls
    #[error("Network error: {message}")]
    Network { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal invariant violations
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PipelineError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::Validation { .. } => StatusCode::BAD_REQUEST,
            PipelineError::NotFound { .. } => StatusCode::NOT_FOUND,
            PipelineError::Permission { .. } => StatusCode::FORBIDDEN,
            PipelineError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            PipelineError::Email { .. } => StatusCode::BAD_GATEWAY,
            PipelineError::Push { .. } => StatusCode::BAD_GATEWAY,
            PipelineError::Auth { .. } => StatusCode::BAD_GATEWAY,
            PipelineError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            PipelineError::Network { .. } => StatusCode::BAD_GATEWAY,
            PipelineError::Serialization { .. } => StatusCode::BAD_REQUEST,
            PipelineError::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            PipelineError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            PipelineError::Validation { .. } => "VALIDATION_ERROR",
            PipelineError::NotFound { .. } => "NOT_FOUND",
            PipelineError::Permission { .. } => "PERMISSION_DENIED",
            PipelineError::Storage { .. } => "STORAGE_ERROR",
            PipelineError::Email { .. } => "EMAIL_ERROR",
            PipelineError::Push { .. } => "PUSH_ERROR",
            PipelineError::Auth { .. } => "PUSH_AUTH_ERROR",
            PipelineError::Timeout { .. } => "TIMEOUT",
            PipelineError::Network { .. } => "NETWORK_ERROR",
            PipelineError::Serialization { .. } => "SERIALIZATION_ERROR",
            PipelineError::Config { .. } => "CONFIG_ERROR",
            PipelineError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Whether a caller may usefully retry the failed operation
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Validation { .. } => false,
            PipelineError::NotFound { .. } => false,
            PipelineError::Permission { .. } => false,
            PipelineError::Storage { .. } => true,
            PipelineError::Email { .. } => true,
            PipelineError::Push { .. } => true,
            PipelineError::Auth { .. } => false,
            PipelineError::Timeout { .. } => true,
            PipelineError::Network { .. } => true,
            PipelineError::Serialization { .. } => false,
            PipelineError::Config { .. } => false,
            PipelineError::Internal { .. } => true,
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
                "status": status.as_u16()
            }
        }));

        (status, body).into_response()
    }
}

// Conversion implementations for external error types

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => PipelineError::NotFound {
                resource: "row".to_string(),
            },
            other => PipelineError::Storage {
                message: other.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PipelineError::Timeout {
                operation: "HTTP request".to_string(),
            }
        } else {
            PipelineError::Network {
                message: err.to_string(),
            }
        }
    }
}

impl From<jsonwebtoken::errors::Error> for PipelineError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        PipelineError::Auth {
            message: format!("assertion signing failed: {err}"),
        }
    }
}

impl From<lettre::error::Error> for PipelineError {
    fn from(err: lettre::error::Error) -> Self {
        PipelineError::Email {
            message: err.to_string(),
        }
    }
}

impl From<lettre::transport::smtp::Error> for PipelineError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        PipelineError::Email {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<tokio::time::error::Elapsed> for PipelineError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        PipelineError::Timeout {
            operation: err.to_string(),
        }
    }
}

// Utility constructors

impl PipelineError {
    pub fn validation<S1: Into<String>, S2: Into<String>>(field: S1, message: S2) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn permission<S: Into<String>>(message: S) -> Self {
        Self::Permission {
            message: message.into(),
        }
    }

    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn email<S: Into<String>>(message: S) -> Self {
        Self::Email {
            message: message.into(),
        }
    }

    pub fn push<S: Into<String>>(message: S) -> Self {
        Self::Push {
            message: message.into(),
        }
    }

    pub fn auth<S: Into<String>>(message: S) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn timeout<S: Into<String>>(operation: S) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
