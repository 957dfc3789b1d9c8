//! Token Endpoint orchestration (C7): the four grant types dispatched from
//! `POST /token`, each ending in a call into `issue_tokens` which is the one
//! place that actually mints an access/refresh/id token triple and persists
//! the access/refresh token row (C8).

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::AppState;
use crate::dto::oauth::{OAuthTokenResponse, TokenRequest};
use crate::error::OAuthError;
use crate::models::oauth_client::OAuthClient;
use crate::repositories::NewOAuthToken;
use crate::utils::jwt::IdentityClaims;
use crate::utils::pkce::verify_pkce;
use crate::utils::secret::{generate_oauth_token, hash_oauth_token};

/// Default scope granted to a client_credentials token when the client asked
/// for none, per spec: `api:read api:write`.
fn client_credentials_default_scopes(_client: &OAuthClient) -> Vec<String> {
    vec!["api:read".to_string(), "api:write".to_string()]
}

struct IssueRequest<'a> {
    client: &'a OAuthClient,
    user_id: Option<Uuid>,
    session_id: Option<Uuid>,
    scopes: Vec<String>,
    auth_time: Option<DateTime<Utc>>,
    nonce: Option<String>,
    acr: Option<String>,
    amr: Vec<String>,
    issue_refresh: bool,
    /// `Some` when this issuance rotates an existing refresh token: the old
    /// row is atomically revoked in the same transaction as the insert, and
    /// the new refresh token inherits the old one's absolute expiry rather
    /// than getting a fresh window (refresh lifetime does not slide).
    rotate_from: Option<(Uuid, DateTime<Utc>)>,
}

async fn issue_tokens(state: &AppState, req: IssueRequest<'_>) -> Result<OAuthTokenResponse, OAuthError> {
    let subject = req.user_id.map(|u| u.to_string()).unwrap_or_else(|| req.client.client_id.clone());
    let (access_jwt, jti, access_expires_at) =
        state.jwt.sign_access_token(&subject, &req.client.client_id, &req.scopes).await?;
    let access_token_hash = hash_oauth_token(&access_jwt);
    let now = Utc::now();
    let access_expires_in = (access_expires_at - now).num_seconds().max(0);

    let refresh_plain = if req.issue_refresh { Some(generate_oauth_token()) } else { None };
    let refresh_token_hash = refresh_plain.as_deref().map(hash_oauth_token);
    let refresh_expires_in_seconds = if req.issue_refresh {
        match req.rotate_from {
            Some((_, preserved_expires_at)) => Some((preserved_expires_at - now).num_seconds().max(0)),
            None => Some(state.config.refresh_token_expiry_secs),
        }
    } else {
        None
    };

    let id_token = if req.scopes.iter().any(|s| s == "openid") {
        if let Some(user_id) = req.user_id {
            let identity = state.user_directory.find_by_id(user_id).await?.map(IdentityClaims::from).unwrap_or_default();
            let auth_time = req.auth_time.unwrap_or(now);
            Some(
                state
                    .jwt
                    .sign_id_token(&subject, &req.client.client_id, req.nonce.as_deref(), auth_time, &identity)
                    .await?,
            )
        } else {
            None
        }
    } else {
        None
    };

    let new_token = NewOAuthToken {
        jti: &jti,
        user_id: req.user_id,
        client_id: req.client.id,
        session_id: req.session_id,
        access_token_hash: &access_token_hash,
        refresh_token_hash: refresh_token_hash.as_deref(),
        scopes: &req.scopes,
        issuer: &state.config.issuer,
        audience: &req.client.client_id,
        auth_time: req.auth_time,
        acr: req.acr.as_deref(),
        amr: &req.amr,
        access_expires_in_seconds: access_expires_in,
        refresh_expires_in_seconds,
    };

    match req.rotate_from {
        Some((old_id, _)) => state.tokens.rotate(old_id, new_token).await?,
        None => state.tokens.create(new_token).await?,
    };

    Ok(OAuthTokenResponse::new(access_jwt, refresh_plain, id_token, access_expires_in, &req.scopes))
}

pub async fn authorization_code_grant(
    state: &AppState,
    client: &OAuthClient,
    form: &TokenRequest,
) -> Result<OAuthTokenResponse, OAuthError> {
    let code = form.code.as_deref().ok_or_else(|| OAuthError::InvalidRequest("code is required".to_string()))?;
    let redirect_uri = form
        .redirect_uri
        .as_deref()
        .ok_or_else(|| OAuthError::InvalidRequest("redirect_uri is required".to_string()))?;

    let code_hash = hash_oauth_token(code);
    let auth_code = state
        .codes
        .find_valid_by_code_hash(&code_hash)
        .await?
        .ok_or_else(|| OAuthError::InvalidGrant("Authorization code is invalid or expired".to_string()))?;

    if auth_code.client_id != client.id {
        return Err(OAuthError::InvalidGrant("Authorization code was not issued to this client".to_string()));
    }
    if auth_code.redirect_uri != redirect_uri {
        return Err(OAuthError::InvalidGrant("redirect_uri does not match the authorization request".to_string()));
    }

    if !auth_code.code_challenge.is_empty() {
        let verifier = form
            .code_verifier
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidRequest("code_verifier is required".to_string()))?;
        if !verify_pkce(verifier, &auth_code.code_challenge, auth_code.code_challenge_method.as_str()) {
            return Err(OAuthError::InvalidGrant("code_verifier does not match code_challenge".to_string()));
        }
    }

    state.codes.mark_as_used(auth_code.id).await?;

    issue_tokens(
        state,
        IssueRequest {
            client,
            user_id: Some(auth_code.user_id),
            session_id: auth_code.session_id,
            scopes: auth_code.scopes,
            auth_time: Some(auth_code.auth_time),
            nonce: auth_code.nonce,
            acr: None,
            amr: vec!["pwd".to_string()],
            issue_refresh: client.grant_types.iter().any(|g| g == "refresh_token"),
            rotate_from: None,
        },
    )
    .await
}

pub async fn refresh_token_grant(
    state: &AppState,
    client: &OAuthClient,
    form: &TokenRequest,
) -> Result<OAuthTokenResponse, OAuthError> {
    let refresh_token = form
        .refresh_token
        .as_deref()
        .ok_or_else(|| OAuthError::InvalidRequest("refresh_token is required".to_string()))?;
    let hash = hash_oauth_token(refresh_token);

    let existing = state
        .tokens
        .find_valid_by_refresh_token_hash(&hash)
        .await?
        .ok_or_else(|| OAuthError::InvalidGrant("refresh_token is invalid, expired, or revoked".to_string()))?;

    if existing.client_id != client.id {
        return Err(OAuthError::InvalidGrant("refresh_token was not issued to this client".to_string()));
    }

    let requested_scopes = form.scopes();
    let scopes = if requested_scopes.is_empty() {
        existing.scopes.clone()
    } else {
        for scope in &requested_scopes {
            if !existing.scopes.contains(scope) {
                return Err(OAuthError::InvalidScope(format!(
                    "scope '{}' was not granted to the original token",
                    scope
                )));
            }
        }
        requested_scopes
    };

    let refresh_expires_at = existing
        .refresh_expires_at
        .ok_or_else(|| OAuthError::ServerError("refresh-valid token missing refresh_expires_at".to_string()))?;

    issue_tokens(
        state,
        IssueRequest {
            client,
            user_id: existing.user_id,
            session_id: existing.session_id,
            scopes,
            auth_time: existing.auth_time,
            nonce: None,
            acr: existing.acr,
            amr: existing.amr,
            issue_refresh: true,
            rotate_from: Some((existing.id, refresh_expires_at)),
        },
    )
    .await
}

pub async fn client_credentials_grant(
    state: &AppState,
    client: &OAuthClient,
    form: &TokenRequest,
) -> Result<OAuthTokenResponse, OAuthError> {
    if client.is_public() {
        return Err(OAuthError::UnauthorizedClient);
    }
    if !client.grant_types.iter().any(|g| g == "client_credentials") {
        return Err(OAuthError::UnauthorizedClient);
    }

    let requested = form.scopes();
    let scopes = if requested.is_empty() { client_credentials_default_scopes(client) } else { requested };
    for scope in &scopes {
        if !client.allows_scope(scope) {
            return Err(OAuthError::InvalidScope(format!("scope '{}' is not allowed for this client", scope)));
        }
    }

    issue_tokens(
        state,
        IssueRequest {
            client,
            user_id: None,
            session_id: None,
            scopes,
            auth_time: None,
            nonce: None,
            acr: None,
            amr: Vec::new(),
            issue_refresh: false,
            rotate_from: None,
        },
    )
    .await
}

pub async fn device_code_grant(
    state: &AppState,
    client: &OAuthClient,
    form: &TokenRequest,
) -> Result<OAuthTokenResponse, OAuthError> {
    if !state.config.device_flow.enabled {
        return Err(OAuthError::FeatureDisabled("Device authorization grant is disabled".to_string()));
    }

    let device_code = form
        .device_code
        .as_deref()
        .ok_or_else(|| OAuthError::InvalidRequest("device_code is required".to_string()))?;

    let device = state.device_flow.poll(device_code).await?;
    if device.client_id != client.id {
        return Err(OAuthError::InvalidGrant("device_code was not issued to this client".to_string()));
    }

    if !state.device_flow.consume(device_code).await? {
        return Err(OAuthError::InvalidGrant("device_code already used".to_string()));
    }

    let user_id = device
        .user_id
        .ok_or_else(|| OAuthError::ServerError("authorized device_code missing user_id".to_string()))?;

    issue_tokens(
        state,
        IssueRequest {
            client,
            user_id: Some(user_id),
            session_id: device.session_id,
            scopes: device.scopes,
            auth_time: Some(Utc::now()),
            nonce: None,
            acr: None,
            amr: vec!["device".to_string()],
            issue_refresh: client.grant_types.iter().any(|g| g == "refresh_token"),
            rotate_from: None,
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_credentials_default_scopes_match_spec_default() {
        let client = test_client();
        assert_eq!(
            client_credentials_default_scopes(&client),
            vec!["api:read".to_string(), "api:write".to_string()]
        );
    }

    fn test_client() -> OAuthClient {
        use crate::models::oauth_client::{ApplicationType, TokenEndpointAuthMethod};
        OAuthClient {
            id: Uuid::new_v4(),
            client_id: "svc-client".to_string(),
            client_secret_hash: Some("hash".to_string()),
            name: "Service Client".to_string(),
            application_type: ApplicationType::Service,
            organization_id: None,
            environment_id: Uuid::new_v4(),
            app_id: Uuid::new_v4(),
            redirect_uris: vec![],
            post_logout_redirect_uris: vec![],
            grant_types: vec!["client_credentials".to_string()],
            response_types: vec![],
            allowed_scopes: vec!["api:read".to_string(), "api:write".to_string()],
            token_endpoint_auth_method: TokenEndpointAuthMethod::ClientSecretBasic,
            require_pkce: false,
            require_consent: false,
            trusted_client: true,
            is_internal: true,
            is_active: true,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
