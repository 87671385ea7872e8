// Login / refresh / logout / me

use axum::{
    extract::{Request, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cookies::{clear_refresh_cookie, refresh_cookie};
use crate::error::{AuthError, AuthResult};
use crate::identity::TokenGrant;
use crate::server::AuthBffState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// Response body for login and refresh. Deliberately omits the refresh
/// token: that credential travels only in the httpOnly cookie.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub access_token: String,
    pub user_context: UserContext,
    pub expires_in: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub id: String,
    pub email: String,
    pub tenant: String,
    pub roles: Vec<String>,
}

fn session_response(grant: &TokenGrant) -> SessionResponse {
    SessionResponse {
        access_token: grant.access_token.clone(),
        user_context: UserContext {
            id: grant.user.id.clone(),
            email: grant.user.email.clone(),
            tenant: grant.user.tenant_id.clone(),
            roles: grant.user.roles.clone(),
        },
        expires_in: grant.expires_in,
    }
}

pub async fn login(
    State(state): State<AuthBffState>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> AuthResult<(CookieJar, Json<SessionResponse>)> {
    if request.username.is_empty() || request.password.is_empty() {
        return Err(AuthError::InvalidCredentials);
    }

    let grant = state
        .provider
        .login(&request.username, &request.password)
        .await?;

    info!(user_id = %grant.user.id, "Login succeeded");

    let jar = jar.add(refresh_cookie(&state.config.cookie, grant.refresh_token.clone()));
    Ok((jar, Json(session_response(&grant))))
}

pub async fn refresh(
    State(state): State<AuthBffState>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> AuthResult<(CookieJar, Json<SessionResponse>)> {
    let cookie_token = jar
        .get(&state.config.cookie.name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty());

    let token = match cookie_token {
        Some(token) => token,
        None if state.config.allow_body_refresh_token => body
            .and_then(|Json(request)| request.refresh_token)
            .filter(|v| !v.is_empty())
            .ok_or(AuthError::MissingRefreshToken)?,
        None => return Err(AuthError::MissingRefreshToken),
    };

    // The provider's single-use policy makes concurrent refreshes safe: at
    // most one exchange per token value succeeds, losers get a 401.
    let grant = state.provider.refresh(&token).await?;

    let jar = jar.add(refresh_cookie(&state.config.cookie, grant.refresh_token.clone()));
    Ok((jar, Json(session_response(&grant))))
}

pub async fn logout(
    State(state): State<AuthBffState>,
    jar: CookieJar,
) -> (CookieJar, StatusCode) {
    if let Some(cookie) = jar.get(&state.config.cookie.name) {
        let token = cookie.value().to_string();
        if !token.is_empty() {
            if let Err(e) = state.provider.logout(&token).await {
                warn!(error = %e, "Provider-side logout failed");
            }
        }
    }

    // Idempotent: clearing an absent cookie is still a 204.
    let jar = jar.add(clear_refresh_cookie(&state.config.cookie));
    (jar, StatusCode::NO_CONTENT)
}

pub async fn me(
    State(state): State<AuthBffState>,
    request: Request,
) -> AuthResult<Json<UserContext>> {
    let token = request
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::InvalidAccessToken)?;

    let claims = state
        .verifier
        .verify(token)
        .await
        .map_err(|_| AuthError::InvalidAccessToken)?;

    Ok(Json(UserContext {
        id: claims.sub.clone(),
        email: claims.email.unwrap_or_default(),
        tenant: claims.tenant_id.unwrap_or_default(),
        roles: claims.roles,
    }))
}
