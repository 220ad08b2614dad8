//! Persisted session state

use chrono::{DateTime, TimeZone, Utc};
use log::warn;
use std::fmt;
use std::sync::Arc;

use crate::store::{KeyValueStore, MemoryStore};
use crate::user::CanonicalUser;
use crate::AuthError;

pub const AUTH_TOKEN_KEY: &str = "authToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const USER_KEY: &str = "user";
pub const CSRF_TOKEN_KEY: &str = "csrfToken";
pub const CSRF_TOKEN_EXPIRY_KEY: &str = "csrfTokenExpiry";

const ALL_KEYS: &[&str] = &[
    AUTH_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    USER_KEY,
    CSRF_TOKEN_KEY,
    CSRF_TOKEN_EXPIRY_KEY,
];

/// Response fields that may carry a bearer token
pub const TOKEN_FIELDS: &[&str] = &["token", "accessToken", "access_token"];

/// Response fields that may carry a refresh token
pub const REFRESH_TOKEN_FIELDS: &[&str] = &["refreshToken", "refresh_token"];

/// Snapshot of the credentials held by the client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub bearer_token: Option<String>,
    pub refresh_token: Option<String>,
    pub csrf_token: Option<String>,
    pub csrf_expiry: Option<DateTime<Utc>>,
}

/// Typed access to the session keys of a [`KeyValueStore`]
///
/// Cloning is cheap; clones share the same underlying store.
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    fn read(&self, key: &str) -> Option<String> {
        self.store.get(key).filter(|v| !v.is_empty())
    }

    pub fn snapshot(&self) -> Session {
        let csrf = self.csrf_token();
        Session {
            bearer_token: self.bearer_token(),
            refresh_token: self.refresh_token(),
            csrf_token: csrf.as_ref().map(|(token, _)| token.clone()),
            csrf_expiry: csrf.map(|(_, expiry)| expiry),
        }
    }

    pub fn bearer_token(&self) -> Option<String> {
        self.read(AUTH_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read(REFRESH_TOKEN_KEY)
    }

    pub fn is_authenticated(&self) -> bool {
        self.bearer_token().is_some()
    }

    /// Replace the bearer token, and the refresh token when one is given
    pub fn store_tokens(&self, bearer: &str, refresh: Option<&str>) -> Result<(), AuthError> {
        self.store.set(AUTH_TOKEN_KEY, bearer)?;
        if let Some(refresh) = refresh {
            self.store.set(REFRESH_TOKEN_KEY, refresh)?;
        }
        Ok(())
    }

    /// The cached signed-in user; a corrupt entry reads as no user
    pub fn user(&self) -> Option<CanonicalUser> {
        let raw = self.read(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(err) => {
                warn!("Ignoring unreadable cached user: {}", err);
                None
            }
        }
    }

    pub fn store_user(&self, user: &CanonicalUser) -> Result<(), AuthError> {
        let raw = serde_json::to_string(user)?;
        self.store.set(USER_KEY, &raw)
    }

    /// The cached CSRF token and its expiry, whether or not it is still fresh
    pub fn csrf_token(&self) -> Option<(String, DateTime<Utc>)> {
        let token = self.read(CSRF_TOKEN_KEY)?;
        let expiry = self
            .read(CSRF_TOKEN_EXPIRY_KEY)
            .and_then(|raw| raw.parse::<i64>().ok())
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())?;
        Some((token, expiry))
    }

    pub fn store_csrf(&self, token: &str, expires_at: DateTime<Utc>) -> Result<(), AuthError> {
        self.store.set(CSRF_TOKEN_KEY, token)?;
        self.store
            .set(CSRF_TOKEN_EXPIRY_KEY, &expires_at.timestamp_millis().to_string())
    }

    pub fn clear_csrf(&self) -> Result<(), AuthError> {
        self.store.remove(CSRF_TOKEN_KEY)?;
        self.store.remove(CSRF_TOKEN_EXPIRY_KEY)
    }

    /// Remove every session key
    pub fn clear(&self) -> Result<(), AuthError> {
        for key in ALL_KEYS {
            self.store.remove(key)?;
        }
        Ok(())
    }
}
