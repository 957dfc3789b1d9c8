//! Token Revocation (C10): RFC 7009. Tries the hinted token kind first, falls
//! back to the other; an unknown token is not an error (§7009 requires 200
//! regardless), and a token that exists but belongs to a different client is
//! silently ignored rather than revoked, so revocation can't be used to
//! attack another client's session.

use crate::config::AppState;
use crate::dto::oauth::RevokeRequest;
use crate::error::OAuthError;
use crate::utils::secret::hash_oauth_token;

pub async fn revoke(state: &AppState, requesting_client_id: &str, req: &RevokeRequest) -> Result<(), OAuthError> {
    let hash = hash_oauth_token(&req.token);

    let as_access = state.tokens.find_by_access_token_hash(&hash).await?;
    let as_refresh = if as_access.is_none() { state.tokens.find_by_refresh_token_hash(&hash).await? } else { None };

    let token = match req.token_type_hint.as_deref() {
        Some("refresh_token") => as_refresh.or(as_access),
        _ => as_access.or(as_refresh),
    };

    let Some(token) = token else {
        return Ok(());
    };

    let client = state.clients.find_by_id(token.client_id).await?;
    let owns_token = client.map(|c| c.client_id == requesting_client_id).unwrap_or(false);
    if !owns_token {
        return Ok(());
    }

    if !token.revoked {
        state.tokens.revoke(token.id).await?;
    }

    Ok(())
}
