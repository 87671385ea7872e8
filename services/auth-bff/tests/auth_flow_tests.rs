// Auth BFF flow tests against a mock identity provider

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use auth_bff::config::{
    AuthBffConfig, CookieConfig, CorsSettings, IdentityProviderConfig, JwksSettings,
};
use auth_bff::identity::HttpIdentityProvider;
use auth_bff::server::AuthBffServer;
use ldp_shared::config::{HttpServerConfig, LoggingConfig};
use ldp_shared::testing::{jwks_body, mint_token, TokenSpec, TEST_ISSUER, TEST_KID};

fn config_for(idp_uri: &str, jwks_uri: &str, allow_body_refresh: bool) -> AuthBffConfig {
    AuthBffConfig {
        server: HttpServerConfig::default(),
        logging: LoggingConfig::default(),
        identity_provider: IdentityProviderConfig {
            base_url: idp_uri.to_string(),
            timeout_seconds: 2,
        },
        cookie: CookieConfig::default(),
        cors: CorsSettings {
            frontend_origin: "http://localhost:5173".to_string(),
        },
        jwks: JwksSettings {
            url: format!("{}/.well-known/jwks.json", jwks_uri),
            issuer: TEST_ISSUER.to_string(),
            refresh_interval_seconds: 300,
            fetch_timeout_seconds: 5,
        },
        allow_body_refresh_token: allow_body_refresh,
    }
}

async fn router_for(idp: &MockServer, allow_body_refresh: bool) -> axum::Router {
    let config = config_for(&idp.uri(), &idp.uri(), allow_body_refresh);
    let provider = Arc::new(HttpIdentityProvider::new(&config.identity_provider).unwrap());
    AuthBffServer::with_provider(config, provider)
        .unwrap()
        .router()
}

fn grant_body(refresh: &str) -> String {
    serde_json::json!({
        "accessToken": "header.payload.sig",
        "refreshToken": refresh,
        "expiresIn": 3600,
        "user": {
            "id": "user-1",
            "email": "ops@ldp-123.example",
            "tenantId": "ldp-123",
            "roles": ["operator"]
        }
    })
    .to_string()
}

fn set_cookie_of(response: &axum::response::Response) -> Option<String> {
    response
        .headers()
        .get("set-cookie")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
}

async fn json_of(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_login_sets_cookie_and_omits_refresh_token_from_body() {
    let idp = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_json(serde_json::json!({
            "username": "ops@ldp-123",
            "password": "P"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(grant_body("refresh-1")))
        .mount(&idp)
        .await;

    let response = router_for(&idp, false)
        .await
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/login")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"username":"ops@ldp-123","password":"P"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let cookie = set_cookie_of(&response).unwrap();
    assert!(cookie.starts_with("refreshToken=refresh-1"));
    assert!(cookie.contains("Path=/auth"));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Strict"));
    assert!(cookie.contains("Max-Age=86400"));

    let body = json_of(response).await;
    assert_eq!(body["accessToken"], "header.payload.sig");
    assert_eq!(body["expiresIn"], 3600);
    assert_eq!(body["userContext"]["tenant"], "ldp-123");
    // The refresh token travels only in the cookie.
    assert!(body.get("refreshToken").is_none());
}

#[tokio::test]
async fn test_login_failure_is_generic_401() {
    let idp = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&idp)
        .await;

    let response = router_for(&idp, false)
        .await
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/login")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"username":"ops","password":"wrong"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_of(response).await;
    // Indistinguishable from a bad username, a bad password, or a missing
    // refresh cookie.
    assert_eq!(body["error"]["message"], "authentication failed");
}

#[tokio::test]
async fn test_disabled_account_is_403_and_provider_down_is_502() {
    let idp = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&idp)
        .await;

    let response = router_for(&idp, false)
        .await
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/login")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"username":"suspended","password":"P"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Unreachable provider.
    let config = config_for("http://127.0.0.1:1", "http://127.0.0.1:1", false);
    let provider = Arc::new(HttpIdentityProvider::new(&config.identity_provider).unwrap());
    let router = AuthBffServer::with_provider(config, provider)
        .unwrap()
        .router();

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/login")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"username":"ops","password":"P"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_refresh_rotates_cookie() {
    let idp = MockServer::start().await;
    // The provider is single-use: refresh-1 exchanges exactly once.
    Mock::given(method("POST"))
        .and(path("/refresh"))
        .and(body_json(serde_json::json!({ "refreshToken": "refresh-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_string(grant_body("refresh-2")))
        .up_to_n_times(1)
        .mount(&idp)
        .await;
    Mock::given(method("POST"))
        .and(path("/refresh"))
        .and(body_json(serde_json::json!({ "refreshToken": "refresh-2" })))
        .respond_with(ResponseTemplate::new(200).set_body_string(grant_body("refresh-3")))
        .mount(&idp)
        .await;
    Mock::given(method("POST"))
        .and(path("/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&idp)
        .await;

    let router = router_for(&idp, false).await;

    // First refresh: cookie rotates to refresh-2.
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/refresh")
                .header("cookie", "refreshToken=refresh-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = set_cookie_of(&response).unwrap();
    assert!(rotated.starts_with("refreshToken=refresh-2"));

    // Replaying the spent token fails.
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/refresh")
                .header("cookie", "refreshToken=refresh-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The rotated token works.
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/refresh")
                .header("cookie", "refreshToken=refresh-2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie_of(&response)
        .unwrap()
        .starts_with("refreshToken=refresh-3"));
}

#[tokio::test]
async fn test_refresh_without_cookie_is_401_by_default() {
    let idp = MockServer::start().await;
    let response = router_for(&idp, false)
        .await
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/refresh")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    // No upstream exchange was attempted.
    assert!(idp.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_body_refresh_token_accepted_only_when_enabled() {
    let idp = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_string(grant_body("refresh-9")))
        .mount(&idp)
        .await;

    // Transitional flag on: body fallback is honored.
    let response = router_for(&idp, true)
        .await
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/refresh")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"refreshToken":"refresh-8"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Flag off: the same request is rejected without an upstream call.
    let calls_before = idp.received_requests().await.unwrap().len();
    let response = router_for(&idp, false)
        .await
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/refresh")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"refreshToken":"refresh-8"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(idp.received_requests().await.unwrap().len(), calls_before);
}

#[tokio::test]
async fn test_logout_clears_cookie_and_is_idempotent() {
    let idp = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/logout"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&idp)
        .await;

    let router = router_for(&idp, false).await;

    // With a cookie: provider notified, cookie cleared.
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .header("cookie", "refreshToken=refresh-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cleared = set_cookie_of(&response).unwrap();
    assert!(cleared.starts_with("refreshToken="));
    assert!(cleared.contains("Max-Age=0"));

    // Without a cookie: still 204.
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_me_returns_token_identity() {
    let idp = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(jwks_body(TEST_KID)))
        .mount(&idp)
        .await;

    let router = router_for(&idp, false).await;
    let token = mint_token(TokenSpec::valid("user-1", "ldp-123"));

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/auth/me")
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_of(response).await;
    assert_eq!(body["id"], "user-1");
    assert_eq!(body["tenant"], "ldp-123");

    // No bearer: 401.
    let response = router
        .oneshot(
            Request::builder()
                .uri("/auth/me")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
