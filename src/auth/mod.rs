//! Authentication and session lifecycle

mod types;

use log::{info, warn};
use serde_json::{json, Value};
use servicefix_auth::{
    endpoints, normalize_user, validate_user, AuthError, CanonicalUser, SessionEvent,
    REFRESH_TOKEN_FIELDS, TOKEN_FIELDS,
};
use servicefix_http::{find_field, find_str, ApiError};
use tokio::sync::broadcast;

use crate::client::ApiClient;

pub use types::*;

/// Client for the `/auth` endpoints
#[derive(Clone)]
pub struct AuthService {
    client: ApiClient,
}

impl AuthService {
    pub(crate) fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Sign in with email and password
    ///
    /// On success the tokens and the normalized user are persisted. A user
    /// record with an unknown role is rejected and no session is stored.
    pub async fn login(&self, email: &str, password: &str) -> Result<CanonicalUser, ApiError> {
        let credentials = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        let payload = self.client.post(endpoints::LOGIN, &credentials).await?;
        let user = self.establish_session(&payload)?;
        info!("Signed in as {} ({})", user.email, user.role);

        self.warm_csrf().await;
        Ok(user)
    }

    /// Create an account
    ///
    /// When the backend answers with tokens the new user is signed in.
    pub async fn register(&self, request: &RegisterRequest) -> Result<CanonicalUser, ApiError> {
        let payload = self.client.post(endpoints::REGISTER, request).await?;

        if find_str(&payload, TOKEN_FIELDS).is_some() {
            let user = self.establish_session(&payload)?;
            self.warm_csrf().await;
            return Ok(user);
        }
        Ok(normalize_user(&payload))
    }

    /// Sign out
    ///
    /// The local session is cleared even when the server call fails.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let session = self.client.session();

        if session.is_authenticated() {
            let body = match session.refresh_token() {
                Some(refresh_token) => json!({ "refreshToken": refresh_token }),
                None => json!({}),
            };
            if let Err(err) = self.client.post(endpoints::LOGOUT, &body).await {
                warn!("Logout request failed; clearing local session anyway: {}", err);
            }
        }

        session.clear()?;
        self.client.emit(SessionEvent::LoggedOut);
        info!("Signed out");
        Ok(())
    }

    /// Ask for a password reset email
    pub async fn forgot_password(&self, email: &str) -> Result<(), ApiError> {
        self.client
            .post(endpoints::FORGOT_PASSWORD, &json!({ "email": email }))
            .await?;
        Ok(())
    }

    /// Set a new password using the token from a reset email
    pub async fn reset_password(&self, token: &str, password: &str) -> Result<(), ApiError> {
        let request = ResetPasswordRequest {
            token: token.to_string(),
            password: password.to_string(),
        };
        self.client.post(endpoints::RESET_PASSWORD, &request).await?;
        Ok(())
    }

    /// Change the signed-in user's password
    pub async fn change_password(&self, current: &str, new: &str) -> Result<(), ApiError> {
        let request = ChangePasswordRequest {
            current_password: current.to_string(),
            new_password: new.to_string(),
        };
        self.client.post(endpoints::CHANGE_PASSWORD, &request).await?;
        Ok(())
    }

    /// The cached signed-in user
    pub fn current_user(&self) -> Option<CanonicalUser> {
        self.client.session().user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.client.session().is_authenticated()
    }

    /// Receive session lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.client.subscribe()
    }

    fn establish_session(&self, payload: &Value) -> Result<CanonicalUser, ApiError> {
        let token = find_str(payload, TOKEN_FIELDS).ok_or(AuthError::MissingField("token"))?;
        let record = find_field(payload, &["user"]).ok_or(AuthError::MissingField("user"))?;
        let user = validate_user(record)?;

        let session = self.client.session();
        session.store_tokens(token, find_str(payload, REFRESH_TOKEN_FIELDS))?;
        session.store_user(&user)?;
        self.client.csrf().invalidate()?;

        self.client.refresh_coordinator().reset();
        self.client.emit(SessionEvent::LoggedIn {
            user_id: user.id.clone(),
        });
        Ok(user)
    }

    async fn warm_csrf(&self) {
        if let Err(err) = self.client.csrf().get_token().await {
            warn!("Could not prefetch CSRF token: {}", err);
        }
    }
}
