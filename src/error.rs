//! Error handling for the ServiceFix client

use servicefix_auth::AuthError;
use servicefix_http::ApiError;
use std::fmt;
use thiserror::Error;

/// Errors raised while setting the client up
///
/// Failures of individual API calls are reported as [`ApiError`]; this type
/// wraps them for code that mixes setup and calls.
#[derive(Error, Debug)]
pub enum Error {
    /// Network or HTTP related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// An API call failed
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Session layer errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }
}
