use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Errors surfaced by the OAuth2/OIDC provider core.
///
/// Variants line up with the RFC 6749 §5.2 and RFC 8628 §3.5 error
/// vocabularies so that `dto::oauth::OAuthErrorResponse` can translate each
/// one without a catch-all.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Client authentication failed")]
    InvalidClient,

    #[error("{0}")]
    InvalidGrant(String),

    #[error("Client is not authorized to use this grant type")]
    UnauthorizedClient,

    #[error("Grant type is not supported")]
    UnsupportedGrantType,

    #[error("Response type is not supported")]
    UnsupportedResponseType,

    #[error("{0}")]
    InvalidScope(String),

    #[error("The resource owner or authorization server denied the request")]
    AccessDenied,

    /// Device flow: the end user hasn't completed the verification step yet.
    #[error("The authorization request is still pending")]
    AuthorizationPending,

    /// Device flow: client polled more often than the declared interval.
    #[error("Polling too frequently, back off")]
    SlowDown,

    /// Device flow: the device_code's lifetime elapsed before it was used.
    #[error("The device_code has expired")]
    ExpiredToken,

    /// A feature the client asked for isn't enabled on this deployment
    /// (e.g. device flow when `device_flow.enabled` is false).
    #[error("{0}")]
    FeatureDisabled(String),

    #[error("{0}")]
    ServerError(String),
}

impl OAuthError {
    /// RFC 6749 §5.2 / RFC 8628 §3.5 `error` value for this variant.
    pub fn error_code(&self) -> &'static str {
        match self {
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidClient => "invalid_client",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::UnauthorizedClient => "unauthorized_client",
            OAuthError::UnsupportedGrantType => "unsupported_grant_type",
            OAuthError::UnsupportedResponseType => "unsupported_response_type",
            OAuthError::InvalidScope(_) => "invalid_scope",
            OAuthError::AccessDenied => "access_denied",
            OAuthError::AuthorizationPending => "authorization_pending",
            OAuthError::SlowDown => "slow_down",
            OAuthError::ExpiredToken => "expired_token",
            OAuthError::FeatureDisabled(_) => "invalid_request",
            OAuthError::ServerError(_) => "server_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            OAuthError::InvalidClient => StatusCode::UNAUTHORIZED,
            OAuthError::UnauthorizedClient => StatusCode::FORBIDDEN,
            OAuthError::FeatureDisabled(_) => StatusCode::NOT_FOUND,
            OAuthError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        if let OAuthError::ServerError(msg) = &self {
            tracing::error!(error = %msg, "oauth server_error");
        }

        let status = self.status_code();
        let body = Json(crate::dto::oauth::OAuthErrorResponse::from(&self));
        (status, body).into_response()
    }
}
