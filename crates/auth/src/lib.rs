//! ServiceFix session layer
//!
//! This crate owns everything the API client needs to keep a user signed
//! in: the persisted session, the canonical user model and its normalizer,
//! the CSRF token cache, and the single-flight bearer token refresh.

pub mod csrf;
pub mod endpoints;
pub mod refresh;
pub mod session;
pub mod store;
pub mod user;

use servicefix_http::ApiError;
use thiserror::Error;

pub use csrf::{generate_csrf_token, is_valid_csrf_token, requires_csrf, CsrfCache, CSRF_HEADER};
pub use refresh::{RefreshCoordinator, RefreshState};
pub use session::{Session, SessionStore, REFRESH_TOKEN_FIELDS, TOKEN_FIELDS};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use user::{normalize_user, validate_user, CanonicalUser, Organization, Role, UserUpdate};

/// Error code attached to [`AuthError::SessionExpired`] once converted to an [`ApiError`]
pub const SESSION_EXPIRED_CODE: &str = "SESSION_EXPIRED";

/// Session layer errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Your session has expired. Please log in again.")]
    SessionExpired,

    #[error("No refresh token available")]
    MissingRefreshToken,

    #[error("Response is missing the `{0}` field")]
    MissingField(&'static str),

    #[error("Token refresh rejected: {0}")]
    RefreshRejected(ApiError),

    #[error("CSRF token request failed: {0}")]
    CsrfFetch(ApiError),

    #[error("Invalid CSRF token: {0}")]
    InvalidCsrfToken(String),

    #[error("Unrecognized role: {0}")]
    UnrecognizedRole(String),

    #[error("Invalid user record: {0}")]
    InvalidUser(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl AuthError {
    pub fn storage<T: std::fmt::Display>(msg: T) -> Self {
        AuthError::Storage(msg.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::SessionExpired
            | AuthError::MissingRefreshToken
            | AuthError::RefreshRejected(_) => {
                ApiError::new(401, AuthError::SessionExpired.to_string()).with_code(SESSION_EXPIRED_CODE)
            }
            AuthError::CsrfFetch(inner) => inner,
            AuthError::InvalidCsrfToken(_) => {
                ApiError::new(0, err.to_string()).with_code("CSRF_TOKEN_UNAVAILABLE")
            }
            AuthError::UnrecognizedRole(_) | AuthError::InvalidUser(_) => {
                ApiError::new(401, err.to_string()).with_code("INVALID_USER")
            }
            AuthError::MissingField(_) => {
                ApiError::new(0, err.to_string()).with_code(servicefix_http::error::INVALID_RESPONSE_CODE)
            }
            AuthError::Storage(_) => ApiError::new(0, err.to_string()).with_code("STORAGE_ERROR"),
            AuthError::NetworkError(inner) => ApiError::from(inner),
            AuthError::SerializationError(inner) => ApiError::from(inner),
        }
    }
}

/// Notifications about session lifecycle changes
///
/// The embedding application subscribes to these to update its UI; an
/// `Expired` event means it should navigate to `redirect_to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn { user_id: String },
    Refreshed,
    LoggedOut,
    Expired { redirect_to: String },
}
