//! Token Introspection (C9): RFC 7662. With no `token_type_hint`, resolution
//! searches access tokens first and falls back to refresh tokens on a miss.
//! An explicit hint searches only that token kind - no cross-type fallback -
//! so a `refresh_token` hint can never resolve an access token and vice
//! versa. A client may only introspect tokens it minted itself - otherwise
//! the response is `{"active": false}`, never an error, so introspection
//! can't be used to enumerate other clients' tokens.

use crate::config::AppState;
use crate::dto::oauth::{IntrospectionRequest, IntrospectionResponse};
use crate::error::OAuthError;
use crate::models::oauth_token::OAuthToken;
use crate::utils::secret::hash_oauth_token;

async fn resolve_token(state: &AppState, req: &IntrospectionRequest) -> Result<Option<OAuthToken>, OAuthError> {
    let hash = hash_oauth_token(&req.token);

    match req.token_type_hint.as_deref() {
        Some("refresh_token") => state.tokens.find_valid_by_refresh_token_hash(&hash).await,
        Some(_access_token_or_other) => state.tokens.find_valid_by_access_token_hash(&hash).await,
        None => match state.tokens.find_valid_by_access_token_hash(&hash).await? {
            Some(token) => Ok(Some(token)),
            None => state.tokens.find_valid_by_refresh_token_hash(&hash).await,
        },
    }
}

pub async fn introspect(
    state: &AppState,
    requesting_client_id: &str,
    req: &IntrospectionRequest,
) -> Result<IntrospectionResponse, OAuthError> {
    let token = match resolve_token(state, req).await? {
        Some(token) => token,
        None => return Ok(IntrospectionResponse::inactive()),
    };

    let client = state.clients.find_by_id(token.client_id).await?;
    let Some(client) = client else {
        return Ok(IntrospectionResponse::inactive());
    };
    if client.client_id != requesting_client_id {
        return Ok(IntrospectionResponse::inactive());
    }

    Ok(IntrospectionResponse {
        active: true,
        scope: Some(token.scopes.join(" ")),
        client_id: Some(client.client_id),
        token_type: Some("Bearer".to_string()),
        exp: Some(token.expires_at.timestamp()),
        iat: Some(token.created_at.timestamp()),
        nbf: Some(token.not_before.timestamp()),
        sub: token.user_id.map(|u| u.to_string()),
        jti: Some(token.jti),
        iss: Some(token.issuer),
        aud: Some(token.audience),
        username: None,
    })
}
