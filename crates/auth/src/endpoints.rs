//! Backend routes the session layer knows about

pub const LOGIN: &str = "/auth/login";
pub const REGISTER: &str = "/auth/register";
pub const REFRESH_TOKEN: &str = "/auth/refresh-token";
pub const LOGOUT: &str = "/auth/logout";
pub const FORGOT_PASSWORD: &str = "/auth/forgot-password";
pub const RESET_PASSWORD: &str = "/auth/reset-password";
pub const CHANGE_PASSWORD: &str = "/auth/change-password";
pub const CSRF_TOKEN: &str = "/auth/csrf-token";

/// Endpoints that never carry a bearer token and never trigger a refresh
const PUBLIC: &[&str] = &[
    LOGIN,
    REGISTER,
    REFRESH_TOKEN,
    FORGOT_PASSWORD,
    RESET_PASSWORD,
    CSRF_TOKEN,
];

fn route(path: &str) -> &str {
    let path = path.split(|c: char| c == '?' || c == '#').next().unwrap_or(path);
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

/// Whether `path` is an unauthenticated auth endpoint
pub fn is_public(path: &str) -> bool {
    PUBLIC.contains(&route(path))
}

/// Whether `path` is exempt from CSRF protection
pub fn is_csrf_exempt(path: &str) -> bool {
    is_public(path) || route(path) == LOGOUT
}

/// Whether a 401 from `path` may be recovered by refreshing the session
pub fn allows_refresh(path: &str) -> bool {
    !is_csrf_exempt(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_classification() {
        assert!(is_public("/auth/login"));
        assert!(is_public("/auth/login/"));
        assert!(is_public("/auth/refresh-token?source=app"));
        assert!(!is_public("/auth/logout"));
        assert!(!is_public("/auth/change-password"));
        assert!(!is_public("/users/12"));

        assert!(is_csrf_exempt("/auth/logout"));
        assert!(is_csrf_exempt("/auth/forgot-password"));
        assert!(!is_csrf_exempt("/auth/change-password"));
        assert!(!is_csrf_exempt("/settings/general"));

        assert!(allows_refresh("/users/12"));
        assert!(allows_refresh("/auth/change-password"));
        assert!(!allows_refresh("/auth/logout"));
        assert!(!allows_refresh("/auth/refresh-token"));
    }
}
