//! Error types for the collection engine
//!
//! - `thiserror` for ergonomic error definitions
//! - Domain-specific variants so callers can decide between retrying,
//!   surfacing a validation message, or giving up
//! - HTTP status code mapping for the API surface

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::borrow::Cow;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the collection engine
#[derive(Debug, Error)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    #[error("Configuration error: {message}")]
    Config {
        message: Cow<'static, str>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Missing required environment variable: {var}")]
    MissingEnvVar { var: &'static str },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidConfig {
        key: &'static str,
        message: Cow<'static, str>,
    },

    #[error("{service} is not configured")]
    NotConfigured { service: &'static str },

    // ========================================================================
    // Validation Errors
    // ========================================================================
    #[error("Enter a valid contract address (0x...): {address}")]
    InvalidAddress { address: String },

    // ========================================================================
    // Indexer / Network Errors
    // ========================================================================
    #[error("Network error: {message}")]
    Network {
        message: Cow<'static, str>,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Indexer rate limit hit (429), retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Indexer API error: {status} - {message}")]
    Upstream {
        status: u16,
        message: Cow<'static, str>,
    },

    // ========================================================================
    // API Errors
    // ========================================================================
    #[error("Bad request: {message}")]
    BadRequest { message: Cow<'static, str> },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    // ========================================================================
    // Serialization / IO Errors
    // ========================================================================
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid data format: {message}")]
    InvalidFormat { message: Cow<'static, str> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    #[error("Internal error")]
    Internal {
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    // ========================================================================
    // Constructors for common error patterns
    // ========================================================================

    /// Create a network error without an underlying client error
    pub fn network(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create an upstream HTTP error; 429 is folded into `RateLimited`
    pub fn upstream(status: u16, message: impl Into<Cow<'static, str>>) -> Self {
        if status == 429 {
            return Self::RateLimited { retry_after_ms: 0 };
        }
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    /// Create a malformed response error
    pub fn invalid_format(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Create a bad request error
    pub fn bad_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Create an internal error
    pub fn internal(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal {
            source: Some(Box::new(source)),
        }
    }

    // ========================================================================
    // Error Classification
    // ========================================================================

    /// Returns true for transient failures (network, timeout, 429, 5xx).
    ///
    /// This does not decide whether the loader retries automatically; every
    /// fetch error is retried up to the attempt cap. It only decides whether
    /// a manual retry is offered once those attempts are exhausted.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network { .. } | Error::Timeout { .. } | Error::RateLimited { .. } => true,
            Error::Upstream { status, .. } => *status >= 500,
            Error::Other(err) => message_looks_transient(&err.to_string()),
            _ => false,
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. }
            | Error::InvalidFormat { .. }
            | Error::InvalidAddress { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::NotConfigured { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Network { .. } | Error::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. }
            | Error::MissingEnvVar { .. }
            | Error::InvalidConfig { .. }
            | Error::NotConfigured { .. } => "CONFIG_ERROR",
            Error::InvalidAddress { .. } => "INVALID_ADDRESS",
            Error::Network { .. } | Error::Upstream { .. } => "INDEXER_ERROR",
            Error::RateLimited { .. } => "RATE_LIMITED",
            Error::Timeout { .. } => "TIMEOUT",
            Error::BadRequest { .. } => "BAD_REQUEST",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::Json(_) | Error::InvalidFormat { .. } => "SERIALIZATION_ERROR",
            Error::Io(_) | Error::Internal { .. } | Error::Other(_) => "INTERNAL_ERROR",
        }
    }
}

/// Message-based classification for errors that arrive without a typed kind.
fn message_looks_transient(message: &str) -> bool {
    let message = message.to_lowercase();
    ["network", "fetch", "timeout", "rate limit", "429", "500", "502", "503"]
        .iter()
        .any(|needle| message.contains(needle))
}

// ============================================================================
// Error Response for API
// ============================================================================

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        // Don't expose internal error details
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let retry_after = match &self {
            Error::RateLimited { retry_after_ms } if *retry_after_ms > 0 => {
                Some(retry_after_ms / 1000)
            }
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code,
                message,
                retryable: self.is_retryable(),
                retry_after,
            },
        };

        (status, Json(body)).into_response()
    }
}

// ============================================================================
// From implementations for external error types
// ============================================================================

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Error::Timeout { timeout_ms: 0 };
        }
        if let Some(status) = err.status() {
            return Error::upstream(status.as_u16(), err.to_string());
        }
        if err.is_decode() {
            return Error::InvalidFormat {
                message: format!("Malformed indexer response: {}", err).into(),
            };
        }
        Error::Network {
            message: err.to_string().into(),
            source: Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(Error::network("connection reset").is_retryable());
        assert!(Error::Timeout { timeout_ms: 1000 }.is_retryable());
        assert!(Error::upstream(429, "slow down").is_retryable());
        assert!(Error::upstream(503, "unavailable").is_retryable());
        assert!(!Error::upstream(404, "missing").is_retryable());
        assert!(!Error::NotConfigured {
            service: "ALCHEMY_API_KEY"
        }
        .is_retryable());
        assert!(!Error::invalid_format("bad json").is_retryable());
        assert!(!Error::InvalidAddress {
            address: "nope".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_other_errors_classified_by_message() {
        assert!(Error::Other(anyhow::anyhow!("Network unreachable")).is_retryable());
        assert!(Error::Other(anyhow::anyhow!("upstream said 502")).is_retryable());
        assert!(!Error::Other(anyhow::anyhow!("contract not found")).is_retryable());
    }

    #[test]
    fn test_429_becomes_rate_limited() {
        assert!(matches!(
            Error::upstream(429, "too many"),
            Error::RateLimited { .. }
        ));
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            Error::not_found("collection", "session").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::InvalidAddress {
                address: "abc".to_string()
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::upstream(500, "boom").status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            Error::Internal { source: None }.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
