// Identity provider client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::IdentityProviderConfig;
use crate::error::{AuthError, AuthResult};

/// Token grant from the identity provider. Refresh tokens are single-use at
/// the provider: every successful exchange returns a fresh one and retires
/// the old.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub tenant_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> AuthResult<TokenGrant>;
    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenGrant>;
    async fn logout(&self, refresh_token: &str) -> AuthResult<()>;
}

pub struct HttpIdentityProvider {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct LoginPayload<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshPayload<'a> {
    refresh_token: &'a str,
}

impl HttpIdentityProvider {
    pub fn new(config: &IdentityProviderConfig) -> AuthResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AuthError::Internal(format!("http client: {}", e)))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_for_grant<T: Serialize>(&self, path: &str, payload: &T) -> AuthResult<TokenGrant> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| AuthError::ProviderUnavailable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => response
                .json()
                .await
                .map_err(|e| AuthError::ProviderUnavailable(format!("decode: {}", e))),
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::BAD_REQUEST => {
                Err(AuthError::InvalidCredentials)
            }
            reqwest::StatusCode::FORBIDDEN => Err(AuthError::AccountDisabled),
            status => Err(AuthError::ProviderUnavailable(format!("status {}", status))),
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn login(&self, username: &str, password: &str) -> AuthResult<TokenGrant> {
        self.post_for_grant("/login", &LoginPayload { username, password })
            .await
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenGrant> {
        self.post_for_grant("/refresh", &RefreshPayload { refresh_token })
            .await
    }

    async fn logout(&self, refresh_token: &str) -> AuthResult<()> {
        let url = format!("{}/logout", self.base_url);
        let result = self
            .http
            .post(&url)
            .json(&RefreshPayload { refresh_token })
            .send()
            .await;

        // Best effort: logout must succeed locally even when the provider
        // cannot be reached.
        if let Err(e) = result {
            warn!(error = %e, "Identity provider logout failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(uri: &str) -> HttpIdentityProvider {
        HttpIdentityProvider::new(&IdentityProviderConfig {
            base_url: uri.to_string(),
            timeout_seconds: 2,
        })
        .unwrap()
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

    #[tokio::test]
    async fn test_login_parses_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .and(body_json(serde_json::json!({
                "username": "ops@ldp-123",
                "password": "P"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(grant_body("refresh-1")))
            .mount(&server)
            .await;

        let grant = provider_for(&server.uri())
            .login("ops@ldp-123", "P")
            .await
            .unwrap();
        assert_eq!(grant.refresh_token, "refresh-1");
        assert_eq!(grant.user.tenant_id, "ldp-123");
        assert_eq!(grant.expires_in, 3600);
    }

    #[tokio::test]
    async fn test_provider_401_maps_to_invalid_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = provider_for(&server.uri()).login("ops", "wrong").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_provider_403_maps_to_account_disabled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let result = provider_for(&server.uri()).login("suspended", "P").await;
        assert!(matches!(result, Err(AuthError::AccountDisabled)));
    }

    #[tokio::test]
    async fn test_unreachable_provider_maps_to_unavailable() {
        let provider = HttpIdentityProvider::new(&IdentityProviderConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout_seconds: 1,
        })
        .unwrap();

        let result = provider.login("ops", "P").await;
        assert!(matches!(result, Err(AuthError::ProviderUnavailable(_))));
    }

    #[tokio::test]
    async fn test_refresh_of_spent_token_is_invalid_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/refresh"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = provider_for(&server.uri()).refresh("spent-token").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_logout_swallows_provider_failures() {
        let provider = HttpIdentityProvider::new(&IdentityProviderConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout_seconds: 1,
        })
        .unwrap();

        assert!(provider.logout("any-token").await.is_ok());
    }
}
