use futures_util::future::join_all;
use serde_json::json;
use servicefix::config::ClientOptions;
use servicefix::{ErrorKind, Role, ServiceFix, SessionEvent};
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CSRF: &str = "5f0e1d2c3b4a59687766554433221100ffeeddccbbaa99887766554433221100";
const FRESH_CSRF: &str = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";

fn test_options() -> ClientOptions {
    ClientOptions::default()
        .with_retry(3, Duration::from_millis(1))
        .with_csrf_retry_delay(Duration::from_millis(10))
}

fn client_for(server: &MockServer) -> ServiceFix {
    ServiceFix::new_with_options(&server.uri(), test_options()).unwrap()
}

fn signed_in(server: &MockServer) -> ServiceFix {
    let servicefix = client_for(server);
    servicefix
        .client()
        .session()
        .store_tokens("bearer-1", Some("refresh-1"))
        .unwrap();
    servicefix
}

fn user_body() -> serde_json::Value {
    json!({
        "id": 42,
        "email": "agent@servicefix.io",
        "first_name": "Ada",
        "last_name": "Lovelace",
        "role": "agent",
        "organization_id": "org-7"
    })
}

async fn mount_csrf(server: &MockServer, token: &str, expected: u64) {
    Mock::given(method("GET"))
        .and(path("/auth/csrf-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "csrfToken": token })))
        .expect(expected)
        .mount(server)
        .await;
}

async fn mount_user_for_bearer(server: &MockServer, bearer: &str, status: u16) {
    let response = if status == 200 {
        ResponseTemplate::new(200).set_body_json(json!({ "status": "success", "data": user_body() }))
    } else {
        ResponseTemplate::new(status).set_body_json(json!({ "message": "Token expired" }))
    };
    Mock::given(method("GET"))
        .and(path("/users/42"))
        .and(header("authorization", format!("Bearer {}", bearer).as_str()))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_login_then_authenticated_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({ "email": "agent@servicefix.io", "password": "hunter2" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": { "token": "bearer-1", "refreshToken": "refresh-1", "user": user_body() }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_csrf(&mock_server, CSRF, 1).await;
    mount_user_for_bearer(&mock_server, "bearer-1", 200).await;

    let servicefix = client_for(&mock_server);
    let mut events = servicefix.auth().subscribe();

    let user = servicefix
        .auth()
        .login("agent@servicefix.io", "hunter2")
        .await
        .unwrap();
    assert_eq!(user.id, "42");
    assert_eq!(user.role, Role::Agent);
    assert_eq!(
        events.try_recv().unwrap(),
        SessionEvent::LoggedIn {
            user_id: "42".to_string()
        }
    );

    let session = servicefix.client().session().snapshot();
    assert_eq!(session.bearer_token.as_deref(), Some("bearer-1"));
    assert_eq!(session.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(session.csrf_token.as_deref(), Some(CSRF));
    assert_eq!(servicefix.auth().current_user(), Some(user.clone()));

    let profile = servicefix.users().get("42").await.unwrap();
    assert_eq!(profile, user);
}

#[tokio::test]
async fn test_login_rejects_unknown_role() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "bearer-1",
            "user": { "id": 1, "email": "x@servicefix.io", "role": "superuser" }
        })))
        .mount(&mock_server)
        .await;
    mount_csrf(&mock_server, CSRF, 0).await;

    let servicefix = client_for(&mock_server);
    let err = servicefix
        .auth()
        .login("x@servicefix.io", "pw")
        .await
        .unwrap_err();

    assert_eq!(err.status, 401);
    assert!(!servicefix.auth().is_authenticated());
}

#[tokio::test]
async fn test_bad_credentials_do_not_trigger_refresh() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "message": "Invalid email or password" })),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh-token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let servicefix = client_for(&mock_server);
    let err = servicefix
        .auth()
        .login("agent@servicefix.io", "wrong")
        .await
        .unwrap_err();

    assert_eq!(err.status, 401);
    assert_eq!(err.message, "Invalid email or password");
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_request_replayed() {
    let mock_server = MockServer::start().await;

    mount_user_for_bearer(&mock_server, "bearer-1", 401).await;
    mount_user_for_bearer(&mock_server, "bearer-2", 200).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh-token"))
        .and(body_json(json!({ "refreshToken": "refresh-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "token": "bearer-2", "refreshToken": "refresh-2" }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_csrf(&mock_server, CSRF, 1).await;

    let servicefix = signed_in(&mock_server);
    let mut events = servicefix.auth().subscribe();

    let user = servicefix.users().get("42").await.unwrap();

    assert_eq!(user.email, "agent@servicefix.io");
    assert_eq!(
        servicefix.client().session().bearer_token().as_deref(),
        Some("bearer-2")
    );
    assert_eq!(events.try_recv().unwrap(), SessionEvent::Refreshed);
}

#[tokio::test]
async fn test_concurrent_unauthorized_requests_share_one_refresh() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/42"))
        .and(header("authorization", "Bearer bearer-1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Token expired" })))
        .expect(5)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/42"))
        .and(header("authorization", "Bearer bearer-2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "status": "success", "data": user_body() })),
        )
        .expect(5)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "token": "bearer-2", "refreshToken": "refresh-2" }))
                .set_delay(Duration::from_millis(50)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_csrf(&mock_server, CSRF, 1).await;

    let servicefix = signed_in(&mock_server);
    let users = servicefix.users();

    let results = join_all((0..5).map(|_| users.get("42"))).await;

    assert_eq!(results.len(), 5);
    for result in results {
        assert_eq!(result.unwrap().id, "42");
    }
}

#[tokio::test]
async fn test_rejected_refresh_ends_session() {
    let mock_server = MockServer::start().await;

    mount_user_for_bearer(&mock_server, "bearer-1", 401).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh-token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Invalid refresh token" })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let servicefix = signed_in(&mock_server);
    let mut events = servicefix.auth().subscribe();

    let err = servicefix.users().get("42").await.unwrap_err();

    assert_eq!(err.status, 401);
    assert_eq!(err.code.as_deref(), Some("SESSION_EXPIRED"));
    assert_eq!(err.kind(), ErrorKind::Auth);
    assert!(!servicefix.auth().is_authenticated());
    assert_eq!(servicefix.client().session().refresh_token(), None);
    assert_eq!(
        events.try_recv().unwrap(),
        SessionEvent::Expired {
            redirect_to: "/login".to_string()
        }
    );
}

#[tokio::test]
async fn test_replayed_request_is_not_refreshed_twice() {
    let mock_server = MockServer::start().await;

    mount_user_for_bearer(&mock_server, "bearer-1", 401).await;
    mount_user_for_bearer(&mock_server, "bearer-2", 401).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "bearer-2" })))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_csrf(&mock_server, CSRF, 1).await;

    let servicefix = signed_in(&mock_server);
    let err = servicefix.users().get("42").await.unwrap_err();

    assert_eq!(err.status, 401);
    assert_eq!(err.message, "Token expired");
}

#[tokio::test]
async fn test_public_route_reports_unauthorized_without_refresh() {
    let mock_server = MockServer::start().await;

    mount_user_for_bearer(&mock_server, "bearer-1", 401).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "bearer-2" })))
        .expect(0)
        .mount(&mock_server)
        .await;

    let servicefix = signed_in(&mock_server);
    servicefix.client().set_current_route("/login");

    let err = servicefix.users().get("42").await.unwrap_err();

    assert_eq!(err.status, 401);
    assert!(servicefix.auth().is_authenticated());
}

#[tokio::test]
async fn test_stale_csrf_token_is_replaced_and_request_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/settings/general"))
        .and(header("x-csrf-token", "stale-token"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(json!({ "message": "invalid csrf token", "code": "EBADCSRFTOKEN" })),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/settings/general"))
        .and(header("x-csrf-token", FRESH_CSRF))
        .and(header("authorization", "Bearer bearer-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": { "theme": "dark" }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_csrf(&mock_server, FRESH_CSRF, 1).await;

    let servicefix = signed_in(&mock_server);
    servicefix
        .client()
        .session()
        .store_csrf("stale-token", chrono::Utc::now() + chrono::Duration::seconds(8))
        .unwrap();

    let stored = servicefix
        .settings()
        .update("general", &json!({ "theme": "dark" }))
        .await
        .unwrap();

    assert_eq!(stored, json!({ "theme": "dark" }));
    assert_eq!(servicefix.client().csrf().cached_token().as_deref(), Some(FRESH_CSRF));
}

#[tokio::test]
async fn test_csrf_refetch_with_expired_token_refreshes_session() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/settings/general"))
        .and(header("x-csrf-token", "stale-token"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(json!({ "message": "invalid csrf token", "code": "EBADCSRFTOKEN" })),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/csrf-token"))
        .and(header("authorization", "Bearer bearer-1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Token expired" })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh-token"))
        .and(body_json(json!({ "refreshToken": "refresh-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "bearer-2",
            "refreshToken": "refresh-2"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/csrf-token"))
        .and(header("authorization", "Bearer bearer-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "csrfToken": FRESH_CSRF })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/settings/general"))
        .and(header("x-csrf-token", FRESH_CSRF))
        .and(header("authorization", "Bearer bearer-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": { "theme": "dark" }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let servicefix = signed_in(&mock_server);
    servicefix
        .client()
        .session()
        .store_csrf("stale-token", chrono::Utc::now() + chrono::Duration::seconds(8))
        .unwrap();
    let mut events = servicefix.auth().subscribe();

    let stored = servicefix
        .settings()
        .update("general", &json!({ "theme": "dark" }))
        .await
        .unwrap();

    assert_eq!(stored, json!({ "theme": "dark" }));
    assert_eq!(
        servicefix.client().session().bearer_token().as_deref(),
        Some("bearer-2")
    );
    assert_eq!(events.try_recv().unwrap(), SessionEvent::Refreshed);
}

#[tokio::test]
async fn test_second_csrf_rejection_is_surfaced() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/settings/general"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({ "message": "Forbidden", "code": "EBADCSRFTOKEN" })),
        )
        .expect(2)
        .mount(&mock_server)
        .await;
    mount_csrf(&mock_server, CSRF, 2).await;

    let servicefix = signed_in(&mock_server);
    let err = servicefix
        .settings()
        .update("general", &json!({ "theme": "dark" }))
        .await
        .unwrap_err();

    assert_eq!(err.status, 403);
    assert_eq!(err.kind(), ErrorKind::Csrf);
}

#[tokio::test]
async fn test_get_server_errors_are_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/settings/general"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "message": "boom" })))
        .expect(3)
        .mount(&mock_server)
        .await;

    let servicefix = signed_in(&mock_server);
    let err = servicefix.settings().get("general").await.unwrap_err();

    assert_eq!(err.status, 500);
    assert_eq!(err.kind(), ErrorKind::Server);
}

#[tokio::test]
async fn test_get_client_errors_are_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/404"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "User not found" })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let servicefix = signed_in(&mock_server);
    let err = servicefix.users().get("404").await.unwrap_err();

    assert_eq!(err.status, 404);
    assert_eq!(err.message, "User not found");
}

#[tokio::test]
async fn test_mutations_are_not_retried_on_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/settings/general"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_csrf(&mock_server, CSRF, 1).await;

    let servicefix = signed_in(&mock_server);
    let err = servicefix
        .settings()
        .update("general", &json!({}))
        .await
        .unwrap_err();

    assert_eq!(err.status, 503);
}

#[tokio::test]
async fn test_unreachable_server_is_a_network_error() {
    let servicefix = ServiceFix::new_with_options(
        "http://127.0.0.1:9",
        test_options().with_retry(1, Duration::from_millis(1)),
    )
    .unwrap();

    let err = servicefix.settings().get("general").await.unwrap_err();

    assert_eq!(err.status, 0);
    assert_eq!(err.kind(), ErrorKind::Network);
}
