//! Operational error taxonomy.
//!
//! Every rejection the core can produce is an expected, structured error:
//! it carries a stable machine-readable code and maps to an HTTP status.
//! Raw stack traces never reach the client.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by the request-security pipeline.
#[derive(Debug, Error)]
pub enum GuardError {
    /// CSRF token operations require a session context.
    #[error("session required for CSRF token operation")]
    SessionRequired,

    /// No CSRF token was presented on an unsafe method.
    #[error("CSRF token missing")]
    CsrfTokenMissing,

    /// Presented CSRF token failed verification.
    #[error("CSRF token invalid")]
    CsrfTokenInvalid,

    /// Origin/Referer did not match the allow-list or request host.
    #[error("origin validation failed: {0}")]
    InvalidOrigin(String),

    /// Per-key request budget exhausted.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },

    /// Client IP is blocked or flagged suspicious.
    #[error("client IP is blocked")]
    IpBlocked,

    /// Shared store could not be reached within its deadline.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl GuardError {
    /// Stable machine-readable code for the response body.
    pub fn code(&self) -> &'static str {
        match self {
            GuardError::SessionRequired => "SESSION_REQUIRED",
            GuardError::CsrfTokenMissing => "CSRF_TOKEN_MISSING",
            GuardError::CsrfTokenInvalid => "CSRF_TOKEN_INVALID",
            GuardError::InvalidOrigin(_) => "INVALID_ORIGIN",
            GuardError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            GuardError::IpBlocked => "IP_BLOCKED",
            GuardError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        }
    }

    /// HTTP status this error is reported as.
    pub fn status(&self) -> StatusCode {
        match self {
            GuardError::SessionRequired => StatusCode::FORBIDDEN,
            GuardError::CsrfTokenMissing => StatusCode::FORBIDDEN,
            GuardError::CsrfTokenInvalid => StatusCode::FORBIDDEN,
            GuardError::InvalidOrigin(_) => StatusCode::FORBIDDEN,
            GuardError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GuardError::IpBlocked => StatusCode::FORBIDDEN,
            // Failing open here would defeat the CSRF control, so store
            // outages on the verification path are a 5xx.
            GuardError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<StoreError> for GuardError {
    fn from(err: StoreError) -> Self {
        GuardError::StoreUnavailable(err.to_string())
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        let mut response = (self.status(), Json(body)).into_response();

        if let GuardError::RateLimitExceeded { retry_after_secs } = &self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

/// Result alias for guard operations.
pub type GuardResult<T> = Result<T, GuardError>;
