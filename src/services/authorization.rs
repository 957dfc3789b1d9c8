//! Authorization Engine (C5): validates GET /authorize requests, drives the
//! authentication/consent sub-flow, and mints authorization codes.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::dto::oauth::{AuthorizationRequest, ConsentDecision, ScopeInfo};
use crate::error::OAuthError;
use crate::models::authorization_code::CodeChallengeMethod;
use crate::models::oauth_client::OAuthClient;
use crate::repositories::{AuthorizationCodeRepository, OAuthClientRepository};
use crate::utils::pkce::{validate_code_verifier, PKCE_METHOD_PLAIN, PKCE_METHOD_S256};
use crate::utils::secret::{generate_oauth_token, hash_oauth_token};

const AUTHORIZATION_CODE_TTL_SECS: i64 = 600;

pub struct ParsedAuthRequest<'a> {
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub response_type: &'a str,
    pub scopes: Vec<String>,
    pub code_challenge: Option<&'a str>,
    pub code_challenge_method: Option<&'a str>,
}

/// Request validation (§4.5, in order, fail-fast). Returns the resolved
/// client on success; the caller still owns deciding whether the redirect_uri
/// is trustworthy enough to deliver subsequent errors to (it is, once this
/// passes).
pub async fn validate_request(
    clients: &OAuthClientRepository,
    req: &ParsedAuthRequest<'_>,
    app_id: Uuid,
    environment_id: Uuid,
    organization_id: Option<Uuid>,
) -> Result<OAuthClient, OAuthError> {
    if req.client_id.is_empty() || req.redirect_uri.is_empty() {
        return Err(OAuthError::InvalidRequest("client_id and redirect_uri are required".to_string()));
    }
    if req.response_type != "code" {
        return Err(OAuthError::UnsupportedResponseType);
    }
    if req.redirect_uri.contains('#') {
        return Err(OAuthError::InvalidRequest("redirect_uri must not contain a fragment".to_string()));
    }

    let client = clients
        .find_by_client_id_with_context(req.client_id, app_id, environment_id, organization_id)
        .await?
        .ok_or(OAuthError::InvalidClient)?;

    if !client.is_active {
        return Err(OAuthError::InvalidClient);
    }
    if !client.has_redirect_uri(req.redirect_uri) {
        return Err(OAuthError::InvalidRequest("redirect_uri is not registered for this client".to_string()));
    }

    if client.require_pkce {
        let challenge = req
            .code_challenge
            .ok_or_else(|| OAuthError::InvalidRequest("code_challenge is required".to_string()))?;
        let method = req.code_challenge_method.unwrap_or(PKCE_METHOD_PLAIN);
        if method != PKCE_METHOD_S256 && method != PKCE_METHOD_PLAIN {
            return Err(OAuthError::InvalidRequest("unsupported code_challenge_method".to_string()));
        }
        if challenge.is_empty() {
            return Err(OAuthError::InvalidRequest("code_challenge must not be empty".to_string()));
        }
    }

    for scope in &req.scopes {
        if !client.allows_scope(scope) {
            return Err(OAuthError::InvalidScope(format!("scope '{}' is not allowed for this client", scope)));
        }
    }

    Ok(client)
}

pub fn scope_infos(scopes: &[String], descriptions: &std::collections::HashMap<String, String>) -> Vec<ScopeInfo> {
    scopes
        .iter()
        .map(|code| ScopeInfo {
            code: code.clone(),
            description: descriptions.get(code).cloned().unwrap_or_default(),
        })
        .collect()
}

/// Mints a single-use authorization code bound to the PKCE challenge and the
/// originating session, per §4.5's "code issuance" rules.
#[allow(clippy::too_many_arguments)]
pub async fn issue_code(
    codes: &AuthorizationCodeRepository,
    client_id: Uuid,
    user_id: Uuid,
    session_id: Option<Uuid>,
    redirect_uri: &str,
    scopes: &[String],
    code_challenge: Option<&str>,
    code_challenge_method: Option<&str>,
    nonce: Option<&str>,
    auth_time: DateTime<Utc>,
) -> Result<String, OAuthError> {
    let code = generate_oauth_token();
    let code_hash = hash_oauth_token(&code);
    let method = match code_challenge_method.unwrap_or(PKCE_METHOD_PLAIN) {
        PKCE_METHOD_S256 => CodeChallengeMethod::S256,
        _ => CodeChallengeMethod::Plain,
    };

    codes
        .create(
            &code_hash,
            client_id,
            user_id,
            session_id,
            redirect_uri,
            scopes,
            code_challenge.unwrap_or(""),
            method,
            nonce,
            auth_time,
            AUTHORIZATION_CODE_TTL_SECS,
        )
        .await?;

    Ok(code)
}

pub fn success_redirect(redirect_uri: &str, code: &str, state: Option<&str>) -> String {
    let separator = if redirect_uri.contains('?') { '&' } else { '?' };
    let mut url = format!("{redirect_uri}{separator}code={}", urlencoding::encode(code));
    if let Some(state) = state {
        url.push_str(&format!("&state={}", urlencoding::encode(state)));
    }
    url
}

pub fn error_redirect(redirect_uri: &str, error: &str, state: Option<&str>) -> String {
    let separator = if redirect_uri.contains('?') { '&' } else { '?' };
    let mut url = format!("{redirect_uri}{separator}error={error}");
    if let Some(state) = state {
        url.push_str(&format!("&state={}", urlencoding::encode(state)));
    }
    url
}

/// Re-validates a posted consent decision against the same rules GET
/// /authorize applied, since the decision carries every parameter back as
/// hidden form fields rather than a server-side session.
pub async fn revalidate_consent_decision(
    clients: &OAuthClientRepository,
    decision: &ConsentDecision,
    app_id: Uuid,
    environment_id: Uuid,
    organization_id: Option<Uuid>,
) -> Result<OAuthClient, OAuthError> {
    validate_request(
        clients,
        &ParsedAuthRequest {
            client_id: &decision.client_id,
            redirect_uri: &decision.redirect_uri,
            response_type: "code",
            scopes: decision.scopes.clone(),
            code_challenge: decision.code_challenge.as_deref(),
            code_challenge_method: decision.code_challenge_method.as_deref(),
        },
        app_id,
        environment_id,
        organization_id,
    )
    .await
}

pub fn validate_pkce_verifier_shape(code_verifier: &str) -> Result<(), OAuthError> {
    if validate_code_verifier(code_verifier) {
        Ok(())
    } else {
        Err(OAuthError::InvalidGrant("code_verifier does not meet RFC 7636 length/charset requirements".to_string()))
    }
}

pub fn request_scopes(req: &AuthorizationRequest) -> Vec<String> {
    req.scopes()
}
