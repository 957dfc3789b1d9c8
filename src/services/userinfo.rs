//! UserInfo Endpoint (C13): RFC to scope-gated claims, per OIDC Core §5.3.2 -
//! only the claims covered by the access token's granted scopes are
//! returned, and a token that was never user-bound (client_credentials) has
//! no userinfo to serve at all.

use uuid::Uuid;

use crate::config::AppState;
use crate::dto::oauth::UserInfoResponse;
use crate::error::OAuthError;
use crate::utils::jwt::AccessTokenClaims;

pub async fn userinfo(state: &AppState, claims: &AccessTokenClaims) -> Result<UserInfoResponse, OAuthError> {
    let scopes: Vec<&str> = claims.scope.split_whitespace().collect();
    if !scopes.contains(&"openid") {
        return Err(OAuthError::InvalidRequest("access token was not granted the openid scope".to_string()));
    }

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| OAuthError::InvalidGrant("access token is not bound to a user".to_string()))?;
    let user = state
        .user_directory
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| OAuthError::InvalidGrant("user no longer exists".to_string()))?;

    let mut response = UserInfoResponse { sub: claims.sub.clone(), ..Default::default() };

    if scopes.contains(&"profile") {
        response.name = user.name;
        response.preferred_username = user.preferred_username;
        response.given_name = user.given_name;
        response.family_name = user.family_name;
    }
    if scopes.contains(&"email") {
        response.email = user.email;
        response.email_verified = Some(user.email_verified);
    }

    Ok(response)
}
