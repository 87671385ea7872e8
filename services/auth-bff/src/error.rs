use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

pub type AuthResult<T> = std::result::Result<T, AuthError>;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account disabled")]
    AccountDisabled,

    #[error("Missing or invalid refresh token")]
    MissingRefreshToken,

    #[error("Invalid access token")]
    InvalidAccessToken,

    #[error("Identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetails,
}

#[derive(Serialize)]
struct ErrorDetails {
    code: &'static str,
    message: &'static str,
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials
            | AuthError::MissingRefreshToken
            | AuthError::InvalidAccessToken => StatusCode::UNAUTHORIZED,
            AuthError::AccountDisabled => StatusCode::FORBIDDEN,
            AuthError::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Generic by design: the body never distinguishes invalid-user from
    /// invalid-password, nor which token check failed.
    fn body(&self) -> ErrorBody {
        let (code, message) = match self {
            AuthError::InvalidCredentials
            | AuthError::MissingRefreshToken
            | AuthError::InvalidAccessToken => ("UNAUTHORIZED", "authentication failed"),
            AuthError::AccountDisabled => ("FORBIDDEN", "account is not permitted to sign in"),
            AuthError::ProviderUnavailable(_) => ("UPSTREAM_UNAVAILABLE", "try again later"),
            AuthError::Internal(_) => ("INTERNAL_ERROR", "internal error"),
        };
        ErrorBody {
            error: ErrorDetails { code, message },
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AuthError::InvalidCredentials.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::MissingRefreshToken.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::AccountDisabled.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AuthError::ProviderUnavailable("idp".to_string()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_credential_errors_share_one_generic_body() {
        let a = AuthError::InvalidCredentials.body();
        let b = AuthError::MissingRefreshToken.body();
        assert_eq!(a.error.code, b.error.code);
        assert_eq!(a.error.message, b.error.message);
    }
}
