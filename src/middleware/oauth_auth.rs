//! Bearer token authentication for endpoints this provider itself exposes
//! beyond the core OAuth surface (e.g. `/userinfo`). Verifies the JWT
//! signature/expiry first, then confirms the token is still live in the
//! token store - a signature check alone can't see revocation.

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::config::AppState;
use crate::error::OAuthError;
use crate::utils::jwt::AccessTokenClaims;
use crate::utils::secret::hash_oauth_token;

/// The validated identity of the bearer token presenting the request,
/// injected into request extensions by [`bearer_auth_middleware`].
#[derive(Debug, Clone)]
pub struct AuthenticatedToken {
    pub claims: AccessTokenClaims,
}

impl AuthenticatedToken {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.claims.scope.split_whitespace().any(|s| s == scope)
    }

    pub fn has_all_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|s| self.has_scope(s))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BearerAuthError {
    #[error("missing or malformed Authorization header")]
    MissingToken,
    #[error(transparent)]
    Token(#[from] OAuthError),
    #[error("token has been revoked")]
    Revoked,
}

impl IntoResponse for BearerAuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            BearerAuthError::MissingToken | BearerAuthError::Revoked => StatusCode::UNAUTHORIZED,
            BearerAuthError::Token(e) => e.status_code(),
        };
        let body = Json(serde_json::json!({ "error": "invalid_token", "error_description": self.to_string() }));
        (status, body).into_response()
    }
}

pub async fn bearer_auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, BearerAuthError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(BearerAuthError::MissingToken)?;

    let claims = state.jwt.verify_access_token(token).await?;

    let hash = hash_oauth_token(token);
    let stored = state.tokens.find_valid_by_access_token_hash(&hash).await?;
    if stored.is_none() {
        return Err(BearerAuthError::Revoked);
    }

    request.extensions_mut().insert(AuthenticatedToken { claims });

    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for AuthenticatedToken
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorBody>);

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        _state: &'life1 S,
    ) -> core::pin::Pin<Box<dyn core::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>>
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            parts.extensions.get::<AuthenticatedToken>().cloned().ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(ErrorBody {
                        error: "invalid_token",
                        error_description: "no bearer token was validated for this request",
                    }),
                )
            })
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub error_description: &'static str,
}
