//! Configuration options for the ServiceFix client

use servicefix_http::RetryPolicy;
use std::time::Duration;

use crate::error::Error;

/// Configuration options for the ServiceFix client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Transport timeout applied to every request
    pub request_timeout: Duration,

    /// How long a CSRF token is reused before a new one is fetched
    pub csrf_cache_ttl: Duration,

    /// Pause before retrying a request the server rejected for its CSRF token
    pub csrf_retry_delay: Duration,

    /// Total attempts for idempotent requests
    pub retry_max_attempts: u32,

    /// First backoff delay for idempotent requests
    pub retry_initial_delay: Duration,

    /// Where the application should send the user when the session ends
    pub login_route: String,

    /// UI routes on which a 401 is reported instead of triggering a refresh
    pub public_routes: Vec<String>,

    /// Accept a locally generated CSRF token when the server's is unusable
    pub allow_generated_csrf_fallback: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            csrf_cache_ttl: Duration::from_secs(10),
            csrf_retry_delay: Duration::from_millis(300),
            retry_max_attempts: 3,
            retry_initial_delay: Duration::from_millis(500),
            login_route: "/login".to_string(),
            public_routes: vec![
                "/login".to_string(),
                "/register".to_string(),
                "/forgot-password".to_string(),
                "/reset-password".to_string(),
            ],
            allow_generated_csrf_fallback: false,
        }
    }
}

impl ClientOptions {
    /// Defaults overridden by `SERVICEFIX_TIMEOUT_SECS`,
    /// `SERVICEFIX_RETRY_ATTEMPTS` and `SERVICEFIX_LOGIN_ROUTE`
    pub fn from_env() -> Result<Self, Error> {
        let mut options = Self::default();

        if let Ok(raw) = std::env::var("SERVICEFIX_TIMEOUT_SECS") {
            let secs = raw.trim().parse::<u64>().map_err(|_| {
                Error::config(format!("SERVICEFIX_TIMEOUT_SECS is not a number: {:?}", raw))
            })?;
            options.request_timeout = Duration::from_secs(secs);
        }
        if let Ok(raw) = std::env::var("SERVICEFIX_RETRY_ATTEMPTS") {
            let attempts = raw.trim().parse::<u32>().map_err(|_| {
                Error::config(format!("SERVICEFIX_RETRY_ATTEMPTS is not a number: {:?}", raw))
            })?;
            options.retry_max_attempts = attempts;
        }
        if let Ok(route) = std::env::var("SERVICEFIX_LOGIN_ROUTE") {
            options.login_route = route;
        }

        Ok(options)
    }

    /// Set the transport timeout
    pub fn with_request_timeout(mut self, value: Duration) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the CSRF token lifetime
    pub fn with_csrf_cache_ttl(mut self, value: Duration) -> Self {
        self.csrf_cache_ttl = value;
        self
    }

    /// Set the pause before a CSRF retry
    pub fn with_csrf_retry_delay(mut self, value: Duration) -> Self {
        self.csrf_retry_delay = value;
        self
    }

    /// Set the retry policy for idempotent requests
    pub fn with_retry(mut self, max_attempts: u32, initial_delay: Duration) -> Self {
        self.retry_max_attempts = max_attempts;
        self.retry_initial_delay = initial_delay;
        self
    }

    pub fn with_login_route(mut self, value: &str) -> Self {
        self.login_route = value.to_string();
        self
    }

    pub fn with_public_routes<I, S>(mut self, routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.public_routes = routes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_generated_csrf_fallback(mut self, value: bool) -> Self {
        self.allow_generated_csrf_fallback = value;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_max_attempts, self.retry_initial_delay)
    }

    /// Whether `route` (a UI route, not an API path) is public
    pub fn is_public_route(&self, route: &str) -> bool {
        let route = route.split(|c: char| c == '?' || c == '#').next().unwrap_or(route);
        let route = match route.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };
        self.public_routes.iter().any(|public| public == route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ClientOptions::default();
        assert_eq!(options.request_timeout, Duration::from_secs(10));
        assert_eq!(options.csrf_cache_ttl, Duration::from_secs(10));
        assert_eq!(options.csrf_retry_delay, Duration::from_millis(300));
        assert_eq!(options.retry_policy(), RetryPolicy::default());
        assert!(!options.allow_generated_csrf_fallback);
    }

    #[test]
    fn test_builders() {
        let options = ClientOptions::default()
            .with_request_timeout(Duration::from_secs(2))
            .with_retry(5, Duration::from_millis(10))
            .with_login_route("/signin")
            .with_public_routes(["/signin", "/welcome"]);

        assert_eq!(options.request_timeout, Duration::from_secs(2));
        assert_eq!(options.retry_policy(), RetryPolicy::new(5, Duration::from_millis(10)));
        assert_eq!(options.login_route, "/signin");
        assert!(options.is_public_route("/welcome/"));
        assert!(options.is_public_route("/signin?next=/tickets"));
        assert!(!options.is_public_route("/login"));
    }
}
