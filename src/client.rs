//! The request pipeline shared by every service
//!
//! Each request goes through the same steps: credentials are attached,
//! the request is dispatched (with backoff for GETs), and failures are
//! routed to the matching recovery path. A CSRF rejection invalidates the
//! token and replays once; a 401 triggers the single-flight refresh and
//! replays once. Anything else comes back as an [`ApiError`].

use log::{debug, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use servicefix_auth::{
    endpoints, requires_csrf, CsrfCache, KeyValueStore, RefreshCoordinator, SessionEvent,
    SessionStore, CSRF_HEADER,
};
use servicefix_http::{unwrap_envelope, with_retry, ApiError};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tokio::time::sleep;
use url::Url;

use crate::config::ClientOptions;
use crate::error::Error;
use crate::fetch::{ApiRequest, RequestBody};

const EVENT_CAPACITY: usize = 32;

struct Inner {
    base_url: String,
    http_client: Client,
    options: ClientOptions,
    session: SessionStore,
    csrf: Arc<CsrfCache>,
    refresh: RefreshCoordinator,
    events: broadcast::Sender<SessionEvent>,
    current_route: RwLock<Option<String>>,
}

/// Session-aware HTTP client for the ServiceFix API
///
/// Cloning is cheap; clones share the session, the CSRF cache and the
/// refresh coordinator.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl ApiClient {
    /// Create a client for the API at `base_url`
    ///
    /// `http_client` is the transport and `store` persists the session;
    /// both are owned by the caller so they can be shared or faked.
    pub fn new(
        base_url: &str,
        http_client: Client,
        store: Arc<dyn KeyValueStore>,
        options: ClientOptions,
    ) -> Result<Self, Error> {
        let parsed = Url::parse(base_url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "unsupported URL scheme {:?}",
                parsed.scheme()
            )));
        }
        let base_url = base_url.trim_end_matches('/').to_string();

        let session = SessionStore::new(store);
        let csrf = Arc::new(
            CsrfCache::new(&base_url, http_client.clone(), session.clone())
                .with_ttl(options.csrf_cache_ttl)
                .with_generated_fallback(options.allow_generated_csrf_fallback),
        );
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let refresh = RefreshCoordinator::new(
            &base_url,
            http_client.clone(),
            session.clone(),
            csrf.clone(),
            events.clone(),
        )
        .with_login_route(&options.login_route);

        Ok(Self {
            inner: Arc::new(Inner {
                base_url,
                http_client,
                options,
                session,
                csrf,
                refresh,
                events,
                current_route: RwLock::new(None),
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    pub fn csrf(&self) -> &CsrfCache {
        &self.inner.csrf
    }

    pub fn refresh_coordinator(&self) -> &RefreshCoordinator {
        &self.inner.refresh
    }

    /// Receive session lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    /// Record the UI route the user is on
    pub fn set_current_route(&self, route: &str) {
        let mut current = self
            .inner
            .current_route
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *current = Some(route.to_string());
    }

    /// Whether the user is on a route where a 401 must not trigger a refresh
    pub fn on_public_route(&self) -> bool {
        let current = self
            .inner
            .current_route
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        current
            .as_deref()
            .map(|route| self.inner.options.is_public_route(route))
            .unwrap_or(false)
    }

    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.execute(ApiRequest::get(path)).await
    }

    pub async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<Value, ApiError> {
        self.execute(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put<B: Serialize>(&self, path: &str, body: &B) -> Result<Value, ApiError> {
        self.execute(ApiRequest::put(path).json(body)?).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.execute(ApiRequest::delete(path)).await
    }

    /// Execute `request` and deserialize the unwrapped payload
    pub async fn execute_as<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let payload = self.execute(request).await?;
        Ok(serde_json::from_value(payload)?)
    }

    /// Execute `request`, recovering from CSRF rejections and expired tokens
    ///
    /// Each recovery path replays the request at most once.
    pub async fn execute(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let mut csrf_retried = false;
        let mut auth_retried = false;

        loop {
            let bearer = if endpoints::is_public(&request.path) {
                None
            } else {
                self.inner.session.bearer_token()
            };

            let err = match self.dispatch(&request, bearer.as_deref()).await {
                Ok(payload) => return Ok(payload),
                Err(err) => err,
            };

            if err.is_csrf_error() && !csrf_retried && requires_csrf(&request.method, &request.path) {
                csrf_retried = true;
                warn!("CSRF token rejected for {} {}; retrying once", request.method, request.path);
                self.inner.csrf.invalidate()?;
                sleep(self.inner.options.csrf_retry_delay).await;
                // The replay fetches the new token; a 401 from that fetch
                // takes the refresh branch below.
                continue;
            }

            if err.is_unauthorized()
                && !auth_retried
                && endpoints::allows_refresh(&request.path)
                && !self.on_public_route()
            {
                auth_retried = true;
                debug!("{} {} returned 401; refreshing session", request.method, request.path);
                self.inner.refresh.refresh(bearer.as_deref()).await?;
                continue;
            }

            return Err(err);
        }
    }

    async fn dispatch(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<Value, ApiError> {
        if request.method == reqwest::Method::GET {
            let policy = self.inner.options.retry_policy();
            with_retry(
                || self.send_once(request, bearer),
                policy.max_attempts,
                policy.initial_delay,
            )
            .await
        } else {
            self.send_once(request, bearer).await
        }
    }

    async fn send_once(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.inner.base_url, request.path);
        debug!("{} {}", request.method, url);

        let mut builder = self.inner.http_client.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if requires_csrf(&request.method, &request.path) {
            let token = self.inner.csrf.get_token().await?;
            builder = builder.header(CSRF_HEADER, token);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(body),
            RequestBody::File(file) => builder.multipart(file.to_form()?),
        };

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let body: Option<Value> = serde_json::from_str(&text).ok();
            return Err(ApiError::from_response(status.as_u16(), body.as_ref()));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok(unwrap_envelope(body))
    }
}
