//! Uniform error shape surfaced to callers of the ServiceFix API

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Error codes the backend uses when it rejects a request's CSRF token
pub const CSRF_ERROR_CODES: &[&str] = &[
    "EBADCSRFTOKEN",
    "CSRF_TOKEN_INVALID",
    "CSRF_TOKEN_MISSING",
    "INVALID_CSRF_TOKEN",
];

/// Code attached to errors raised before any response was received
pub const NETWORK_ERROR_CODE: &str = "NETWORK_ERROR";

/// Code attached to transport timeouts
pub const TIMEOUT_CODE: &str = "TIMEOUT";

/// Code attached to responses whose body could not be understood
pub const INVALID_RESPONSE_CODE: &str = "INVALID_RESPONSE";

/// Coarse classification of an [`ApiError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No response was received
    Network,
    /// 401; recoverable by refreshing the session
    Auth,
    /// 403 carrying a CSRF error code; recoverable by one retry
    Csrf,
    /// Client error with structured field errors
    Validation,
    /// 5xx
    Server,
    Unknown,
}

/// The error every API call resolves to when it fails
///
/// Serializes to `{ message, status, code?, errors? }`. A `status` of `0`
/// means no HTTP response was received.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message} (status {status})")]
pub struct ApiError {
    pub message: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
}

impl ApiError {
    pub fn new<T: Into<String>>(status: u16, message: T) -> Self {
        Self {
            message: message.into(),
            status,
            code: None,
            errors: None,
        }
    }

    /// Attach a machine readable error code
    pub fn with_code<T: Into<String>>(mut self, code: T) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Error for a request that never produced a response
    pub fn network<T: Into<String>>(message: T) -> Self {
        Self::new(0, message).with_code(NETWORK_ERROR_CODE)
    }

    /// Build an error from a non-success status and its (optional) JSON body
    ///
    /// The message is looked up in `message`, `error`, `error.message` and
    /// `data.message`, falling back to a default for the status.
    pub fn from_response(status: u16, body: Option<&Value>) -> Self {
        let message = body
            .and_then(extract_message)
            .unwrap_or_else(|| default_message(status).to_string());

        let code = body.and_then(|b| {
            first_string(b, &["code", "error_code", "errorCode"]).or_else(|| {
                b.get("error")
                    .and_then(|e| first_string(e, &["code"]))
            })
        });

        let errors = body.and_then(|b| {
            b.get("errors")
                .or_else(|| b.get("data").and_then(|d| d.get("errors")))
                .filter(|v| !v.is_null())
                .cloned()
        });

        Self {
            message,
            status,
            code,
            errors,
        }
    }

    /// Classify this error according to the client's recovery rules
    pub fn kind(&self) -> ErrorKind {
        match self.status {
            0 => match self.code.as_deref() {
                Some(NETWORK_ERROR_CODE) | Some(TIMEOUT_CODE) => ErrorKind::Network,
                _ => ErrorKind::Unknown,
            },
            401 => ErrorKind::Auth,
            403 if self.is_csrf_error() => ErrorKind::Csrf,
            400 | 422 => ErrorKind::Validation,
            400..=499 if self.errors.is_some() => ErrorKind::Validation,
            500..=599 => ErrorKind::Server,
            _ => ErrorKind::Unknown,
        }
    }

    /// Whether the backend rejected the request's CSRF token
    pub fn is_csrf_error(&self) -> bool {
        if self.status != 403 {
            return false;
        }
        let by_code = self
            .code
            .as_deref()
            .map(|code| CSRF_ERROR_CODES.iter().any(|c| c.eq_ignore_ascii_case(code)))
            .unwrap_or(false);
        by_code || self.message.to_ascii_lowercase().contains("csrf")
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return ApiError::from_response(status.as_u16(), None);
        }
        if err.is_timeout() {
            return ApiError::new(0, "The request timed out. Please try again.").with_code(TIMEOUT_CODE);
        }
        if err.is_decode() {
            return ApiError::new(0, format!("Invalid response from server: {}", err))
                .with_code(INVALID_RESPONSE_CODE);
        }
        ApiError::network(format!("Network error. Please check your connection. ({})", err))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::new(0, format!("Invalid response from server: {}", err)).with_code(INVALID_RESPONSE_CODE)
    }
}

fn default_message(status: u16) -> &'static str {
    match status {
        400 => "Invalid request",
        401 => "Authentication required",
        403 => "You do not have permission to perform this action",
        404 => "The requested resource was not found",
        408 => "The request timed out. Please try again.",
        409 => "The request conflicts with the current state of the resource",
        422 => "Validation failed",
        429 => "Too many requests. Please slow down.",
        500..=599 => "Server error. Please try again later.",
        _ => "An unexpected error occurred",
    }
}

fn extract_message(body: &Value) -> Option<String> {
    if let Some(text) = body.as_str() {
        return Some(text.to_string()).filter(|t| !t.trim().is_empty());
    }
    first_string(body, &["message", "error"])
        .or_else(|| body.get("error").and_then(|e| first_string(e, &["message"])))
        .or_else(|| body.get("data").and_then(|d| first_string(d, &["message"])))
}

fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .filter_map(Value::as_str)
        .find(|s| !s.trim().is_empty())
        .map(str::to_string)
}
