//! CSRF token cache

use chrono::Utc;
use log::{debug, warn};
use rand::RngCore;
use reqwest::{Client, Method};
use serde_json::Value;
use servicefix_http::{find_str, ApiError};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::endpoints;
use crate::session::SessionStore;
use crate::AuthError;

/// Header carrying the CSRF token on mutating requests
pub const CSRF_HEADER: &str = "x-csrf-token";

/// How long a fetched token is reused before asking the server again
pub const DEFAULT_CSRF_TTL: Duration = Duration::from_secs(10);

const CSRF_FIELDS: &[&str] = &["csrfToken", "csrf_token", "token"];

/// Server tokens are 32 random bytes, hex encoded
pub fn is_valid_csrf_token(token: &str) -> bool {
    token.len() == 64
        && token
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// A random token in the server's format
pub fn generate_csrf_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Whether a request needs an `x-csrf-token` header
pub fn requires_csrf(method: &Method, path: &str) -> bool {
    let safe = *method == Method::GET || *method == Method::HEAD || *method == Method::OPTIONS;
    !safe && !endpoints::is_csrf_exempt(path)
}

/// Caches the session's CSRF token and fetches a new one when it goes stale
///
/// Concurrent callers that miss the cache queue behind a single fetch and
/// then read its result, so a burst of requests costs one round trip.
pub struct CsrfCache {
    base_url: String,
    http_client: Client,
    session: SessionStore,
    ttl: Duration,
    allow_generated_fallback: bool,
    in_flight: Mutex<()>,
}

impl CsrfCache {
    pub fn new(base_url: &str, http_client: Client, session: SessionStore) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
            session,
            ttl: DEFAULT_CSRF_TTL,
            allow_generated_fallback: false,
            in_flight: Mutex::new(()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Substitute a locally generated token when the server sends none or a
    /// malformed one. Off by default: the server will normally reject a
    /// token it never issued.
    pub fn with_generated_fallback(mut self, allow: bool) -> Self {
        self.allow_generated_fallback = allow;
        self
    }

    /// The cached token, if it has not expired
    pub fn cached_token(&self) -> Option<String> {
        let (token, expires_at) = self.session.csrf_token()?;
        if expires_at > Utc::now() {
            Some(token)
        } else {
            None
        }
    }

    /// Return a fresh token, fetching one if the cache is empty or stale
    pub async fn get_token(&self) -> Result<String, AuthError> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let _flight = self.in_flight.lock().await;
        if let Some(token) = self.cached_token() {
            debug!("CSRF token fetched by a concurrent request");
            return Ok(token);
        }

        let token = self.fetch().await?;
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::seconds(10));
        self.session.store_csrf(&token, Utc::now() + ttl)?;
        Ok(token)
    }

    /// Drop the cached token so the next call fetches a new one
    pub fn invalidate(&self) -> Result<(), AuthError> {
        debug!("Invalidating cached CSRF token");
        self.session.clear_csrf()
    }

    async fn fetch(&self) -> Result<String, AuthError> {
        let url = format!("{}{}", self.base_url, endpoints::CSRF_TOKEN);
        debug!("Fetching CSRF token from {}", url);

        let mut request = self.http_client.get(&url);
        if let Some(token) = self.session.bearer_token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let body: Option<Value> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            return Err(AuthError::CsrfFetch(ApiError::from_response(
                status.as_u16(),
                body.as_ref(),
            )));
        }

        let problem = match body.as_ref().and_then(|b| find_str(b, CSRF_FIELDS)) {
            Some(token) if is_valid_csrf_token(token) => return Ok(token.to_string()),
            Some(_) => "token has an unexpected format",
            None => "no token in response",
        };

        if self.allow_generated_fallback {
            warn!("CSRF endpoint returned an unusable token ({}); using a generated one", problem);
            Ok(generate_csrf_token())
        } else {
            Err(AuthError::InvalidCsrfToken(problem.to_string()))
        }
    }
}
