//! ServiceFix Rust Client Library
//!
//! A Rust client for the ServiceFix support desk API. It keeps the signed-in
//! session, attaches bearer and CSRF tokens, refreshes expired sessions
//! exactly once no matter how many requests hit a 401 together, and
//! normalizes the backend's response and error shapes.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod fetch;
pub mod settings;
pub mod sla;
pub mod users;

use reqwest::Client;
use servicefix_auth::{KeyValueStore, MemoryStore};
use std::sync::Arc;

use crate::auth::AuthService;
use crate::client::ApiClient;
use crate::config::ClientOptions;
use crate::error::Error;
use crate::settings::SettingsService;
use crate::sla::SlaService;
use crate::users::UserService;

pub use error::Error as ServiceFixError;
pub use servicefix_auth::{
    CanonicalUser, FileStore, Organization, Role, SessionEvent, SessionStore, UserUpdate,
};
pub use servicefix_http::{ApiError, ErrorKind};

/// The main entry point for the ServiceFix client
#[derive(Clone)]
pub struct ServiceFix {
    client: ApiClient,
}

impl ServiceFix {
    /// Create a client with an in-memory session
    ///
    /// # Example
    ///
    /// ```
    /// use servicefix::ServiceFix;
    ///
    /// let servicefix = ServiceFix::new("https://api.servicefix.io").unwrap();
    /// assert!(!servicefix.auth().is_authenticated());
    /// ```
    pub fn new(base_url: &str) -> Result<Self, Error> {
        Self::new_with_options(base_url, ClientOptions::default())
    }

    /// Create a client with custom options and an in-memory session
    ///
    /// # Example
    ///
    /// ```
    /// use servicefix::{ServiceFix, config::ClientOptions};
    /// use std::time::Duration;
    ///
    /// let options = ClientOptions::default().with_request_timeout(Duration::from_secs(5));
    /// let servicefix = ServiceFix::new_with_options("https://api.servicefix.io", options).unwrap();
    /// ```
    pub fn new_with_options(base_url: &str, options: ClientOptions) -> Result<Self, Error> {
        Self::with_store(base_url, options, Arc::new(MemoryStore::new()))
    }

    /// Create a client whose session lives in `store`
    ///
    /// Use a [`FileStore`] to keep the session across runs.
    pub fn with_store(
        base_url: &str,
        options: ClientOptions,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(options.request_timeout)
            .cookie_store(true)
            .build()?;
        let client = ApiClient::new(base_url, http_client, store, options)?;
        Ok(Self { client })
    }

    /// Create a client from `SERVICEFIX_API_URL` and the `SERVICEFIX_*` option variables
    pub fn from_env() -> Result<Self, Error> {
        let base_url = std::env::var("SERVICEFIX_API_URL")
            .map_err(|_| Error::config("SERVICEFIX_API_URL is not set"))?;
        Self::new_with_options(&base_url, ClientOptions::from_env()?)
    }

    /// Sign-in, sign-out and password management
    pub fn auth(&self) -> AuthService {
        AuthService::new(self.client.clone())
    }

    /// User profiles
    pub fn users(&self) -> UserService {
        UserService::new(self.client.clone())
    }

    /// Application settings
    pub fn settings(&self) -> SettingsService {
        SettingsService::new(self.client.clone())
    }

    /// SLA metrics
    pub fn sla(&self) -> SlaService {
        SlaService::new(self.client.clone())
    }

    /// The underlying request pipeline, for endpoints without a dedicated service
    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::client::ApiClient;
    pub use crate::config::ClientOptions;
    pub use crate::error::Error;
    pub use crate::fetch::ApiRequest;
    pub use crate::ServiceFix;
    pub use servicefix_auth::{CanonicalUser, Role, SessionEvent};
    pub use servicefix_http::{ApiError, ErrorKind};
}
