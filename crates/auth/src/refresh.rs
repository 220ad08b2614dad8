//! Single-flight bearer token refresh

use log::{debug, error, info, warn};
use reqwest::Client;
use serde_json::{json, Value};
use servicefix_http::{find_str, ApiError};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{broadcast, Mutex};

use crate::csrf::CsrfCache;
use crate::endpoints;
use crate::session::{SessionStore, REFRESH_TOKEN_FIELDS, TOKEN_FIELDS};
use crate::{AuthError, SessionEvent};

/// Route the application shows when a session ends
pub const DEFAULT_LOGIN_ROUTE: &str = "/login";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
    /// The last refresh failed and the session was torn down
    Failed,
}

/// Exchanges the refresh token for a new bearer token, at most once at a time
///
/// Callers pass the bearer token their failed request carried. Refreshes
/// are serialized; a caller that gets the guard after someone else already
/// replaced that token receives the new one without another round trip.
/// After a failed refresh every waiting caller gets
/// [`AuthError::SessionExpired`] until [`RefreshCoordinator::reset`] is
/// called by a new login.
pub struct RefreshCoordinator {
    base_url: String,
    http_client: Client,
    session: SessionStore,
    csrf: Arc<CsrfCache>,
    events: broadcast::Sender<SessionEvent>,
    login_route: String,
    state: RwLock<RefreshState>,
    flight: Mutex<()>,
}

impl RefreshCoordinator {
    pub fn new(
        base_url: &str,
        http_client: Client,
        session: SessionStore,
        csrf: Arc<CsrfCache>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
            session,
            csrf,
            events,
            login_route: DEFAULT_LOGIN_ROUTE.to_string(),
            state: RwLock::new(RefreshState::Idle),
            flight: Mutex::new(()),
        }
    }

    pub fn with_login_route(mut self, route: &str) -> Self {
        self.login_route = route.to_string();
        self
    }

    pub fn state(&self) -> RefreshState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: RefreshState) {
        let mut current = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *current != state {
            debug!("Refresh state {:?} -> {:?}", *current, state);
            *current = state;
        }
    }

    /// Return to `Idle` after a successful login
    pub fn reset(&self) {
        self.set_state(RefreshState::Idle);
    }

    /// Obtain a bearer token newer than `stale_bearer`
    pub async fn refresh(&self, stale_bearer: Option<&str>) -> Result<String, AuthError> {
        let _flight = self.flight.lock().await;

        if self.state() == RefreshState::Failed {
            return Err(AuthError::SessionExpired);
        }
        if let Some(current) = self.session.bearer_token() {
            if stale_bearer != Some(current.as_str()) {
                debug!("Bearer token already refreshed by a concurrent request");
                return Ok(current);
            }
        }

        self.set_state(RefreshState::Refreshing);
        info!("Refreshing bearer token");

        match self.exchange().await {
            Ok(token) => {
                self.set_state(RefreshState::Idle);
                let _ = self.events.send(SessionEvent::Refreshed);
                info!("Bearer token refreshed");
                Ok(token)
            }
            Err(err) => {
                warn!("Token refresh failed: {}", err);
                self.teardown();
                Err(AuthError::SessionExpired)
            }
        }
    }

    async fn exchange(&self) -> Result<String, AuthError> {
        let refresh_token = self
            .session
            .refresh_token()
            .ok_or(AuthError::MissingRefreshToken)?;

        let url = format!("{}{}", self.base_url, endpoints::REFRESH_TOKEN);
        let response = self
            .http_client
            .post(&url)
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let body: Option<Value> = serde_json::from_str(&text).ok();
            return Err(AuthError::RefreshRejected(ApiError::from_response(
                status.as_u16(),
                body.as_ref(),
            )));
        }

        let body: Value = serde_json::from_str(&text)?;
        let token = find_str(&body, TOKEN_FIELDS).ok_or(AuthError::MissingField("token"))?;
        let rotated = find_str(&body, REFRESH_TOKEN_FIELDS);
        self.session.store_tokens(token, rotated)?;

        self.csrf.invalidate()?;
        if let Err(err) = self.csrf.get_token().await {
            warn!("Could not fetch a CSRF token after refresh: {}", err);
        }

        Ok(token.to_string())
    }

    /// Clear the session and tell the application to send the user to login
    fn teardown(&self) {
        if let Err(err) = self.session.clear() {
            error!("Failed to clear session after refresh failure: {}", err);
        }
        self.set_state(RefreshState::Failed);
        let _ = self.events.send(SessionEvent::Expired {
            redirect_to: self.login_route.clone(),
        });
    }
}
