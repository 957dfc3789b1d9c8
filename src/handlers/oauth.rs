//! HTTP surface for the OAuth2/OpenID Connect provider core (§6).
//!
//! Every handler here is a thin adapter: it decodes the request, resolves the
//! caller (client authentication, or the end user's session), delegates to
//! the service layer, and encodes the result. The actual protocol logic
//! lives in `crate::services::*`.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Extension, Form, Json,
};
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::AppState;
use crate::dto::oauth::{
    AuthenticationRequiredResponse, AuthorizationRequest, ClientRegistrationRequest,
    ConsentAction, ConsentDecision, ConsentScreenInfo, DeviceApprovalRequest,
    DeviceApprovalResponse, DeviceAuthorizationRequest, DeviceVerifyRequest,
    IntrospectionRequest, RevokeRequest, TokenRequest,
};
use crate::error::OAuthError;
use crate::middleware::AuthenticatedToken;
use crate::models::OAuthEventType;
use crate::services::{
    authorization, client_auth::Endpoint, client_registry, discovery, introspection, revocation,
    token_endpoint, userinfo,
};

// ============================================================================
// End-user session resolution
// ============================================================================

/// Resolves the end user session carrying a GET /authorize or /device
/// request, per §4.5: cookie `authsome_session`, the legacy `session_token`
/// cookie, or a bearer session token. None of these is a JWT access token -
/// they are opaque handles into the (out-of-scope) session service.
fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(cookie_header) = headers.get(axum::http::header::COOKIE).and_then(|v| v.to_str().ok()) {
        let mut legacy = None;
        for pair in cookie_header.split(';') {
            let pair = pair.trim();
            if let Some((name, value)) = pair.split_once('=') {
                if name == "authsome_session" {
                    return Some(value.to_string());
                }
                if name == "session_token" {
                    legacy = Some(value.to_string());
                }
            }
        }
        if legacy.is_some() {
            return legacy;
        }
    }

    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
}

async fn resolve_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<crate::services::session::Session>, OAuthError> {
    match extract_session_token(headers) {
        Some(token) => state.sessions.find_by_token(&token).await,
        None => Ok(None),
    }
}

// ============================================================================
// GET /jwks
// ============================================================================

pub async fn jwks_handler(State(state): State<AppState>) -> Response {
    Json(state.keys.jwks().await).into_response()
}

// ============================================================================
// GET /.well-known/openid-configuration
// ============================================================================

pub async fn openid_configuration_handler(State(state): State<AppState>) -> Response {
    Json(discovery::discovery_document(&state.config)).into_response()
}

// ============================================================================
// GET /authorize (C5)
// ============================================================================

pub async fn authorize_handler(
    State(state): State<AppState>,
    Query(req): Query<AuthorizationRequest>,
    headers: HeaderMap,
) -> Response {
    let scopes = req.scopes();
    let parsed = authorization::ParsedAuthRequest {
        client_id: &req.client_id,
        redirect_uri: &req.redirect_uri,
        response_type: &req.response_type,
        scopes: scopes.clone(),
        code_challenge: req.code_challenge.as_deref(),
        code_challenge_method: req.code_challenge_method.as_deref(),
    };

    let client = match authorization::validate_request(
        &state.clients,
        &parsed,
        state.config.app_id,
        state.config.environment_id,
        state.config.organization_id,
    )
    .await
    {
        Ok(client) => client,
        Err(e) => return error_response(&state, &req.redirect_uri, &e, req.state.as_deref()).await,
    };

    state
        .audit
        .create(
            OAuthEventType::AuthorizationRequested,
            Some(client.id),
            None,
            None,
            Some(serde_json::json!({ "scopes": scopes, "redirect_uri": req.redirect_uri })),
        )
        .await
        .ok();

    let session = match resolve_session(&state, &headers).await {
        Ok(session) => session,
        Err(e) => return error_response(&state, &req.redirect_uri, &e, req.state.as_deref()).await,
    };

    let Some(session) = session else {
        return authentication_required(&state, &req);
    };

    let has_consent = match state.consent.check_consent(&client, session.user_id, &scopes).await {
        Ok(ok) => ok,
        Err(e) => return error_response(&state, &req.redirect_uri, &e, req.state.as_deref()).await,
    };

    if has_consent {
        return issue_code_and_redirect(
            &state,
            &client,
            session.user_id,
            Some(session.id),
            &req.redirect_uri,
            &scopes,
            req.code_challenge.as_deref(),
            req.code_challenge_method.as_deref(),
            req.nonce.as_deref(),
            req.state.as_deref(),
        )
        .await;
    }

    render_consent_screen(&state, &client, &req, &scopes).await
}

fn authentication_required(state: &AppState, req: &AuthorizationRequest) -> Response {
    if state.config.api_mode {
        let body = AuthenticationRequiredResponse {
            error: "authentication_required",
            login_url: format!("{}?return_to={}", state.config.login_url, urlencoding::encode(&current_authorize_url(req))),
        };
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    } else {
        let location = format!("{}?return_to={}", state.config.login_url, urlencoding::encode(&current_authorize_url(req)));
        Redirect::temporary(&location).into_response()
    }
}

fn current_authorize_url(req: &AuthorizationRequest) -> String {
    let mut url = format!(
        "/authorize?client_id={}&redirect_uri={}&response_type={}",
        urlencoding::encode(&req.client_id),
        urlencoding::encode(&req.redirect_uri),
        urlencoding::encode(&req.response_type),
    );
    if let Some(scope) = &req.scope {
        url.push_str(&format!("&scope={}", urlencoding::encode(scope)));
    }
    if let Some(state) = &req.state {
        url.push_str(&format!("&state={}", urlencoding::encode(state)));
    }
    if let Some(challenge) = &req.code_challenge {
        url.push_str(&format!("&code_challenge={}", urlencoding::encode(challenge)));
    }
    if let Some(method) = &req.code_challenge_method {
        url.push_str(&format!("&code_challenge_method={}", urlencoding::encode(method)));
    }
    url
}

/// Scope descriptions for the consent screen come from the scope registry;
/// an unknown scope just renders with an empty description rather than
/// failing the whole screen.
async fn render_consent_screen(
    state: &AppState,
    client: &crate::models::OAuthClient,
    req: &AuthorizationRequest,
    scopes: &[String],
) -> Response {
    let rows = state.scopes.find_by_codes(scopes).await.unwrap_or_default();
    let descriptions: HashMap<String, String> = rows.into_iter().map(|s| (s.code, s.description)).collect();

    let screen = ConsentScreenInfo {
        client_name: client.name.clone(),
        scopes: authorization::scope_infos(scopes, &descriptions),
        redirect_uri: req.redirect_uri.clone(),
        state: req.state.clone(),
    };

    Json(screen).into_response()
}

#[allow(clippy::too_many_arguments)]
async fn issue_code_and_redirect(
    state: &AppState,
    client: &crate::models::OAuthClient,
    user_id: Uuid,
    session_id: Option<Uuid>,
    redirect_uri: &str,
    scopes: &[String],
    code_challenge: Option<&str>,
    code_challenge_method: Option<&str>,
    nonce: Option<&str>,
    oauth_state: Option<&str>,
) -> Response {
    let auth_time = chrono::Utc::now();
    let code = match authorization::issue_code(
        &state.codes,
        client.id,
        user_id,
        session_id,
        redirect_uri,
        scopes,
        code_challenge,
        code_challenge_method,
        nonce,
        auth_time,
    )
    .await
    {
        Ok(code) => code,
        Err(e) => return error_response(state, redirect_uri, &e, oauth_state).await,
    };

    state
        .audit
        .create(OAuthEventType::AuthorizationCodeIssued, Some(client.id), Some(user_id), None, None)
        .await
        .ok();

    Redirect::temporary(&authorization::success_redirect(redirect_uri, &code, oauth_state)).into_response()
}

async fn error_response(state: &AppState, redirect_uri: &str, error: &OAuthError, oauth_state: Option<&str>) -> Response {
    if matches!(error, OAuthError::ServerError(_)) {
        return error_as_json(error);
    }
    if redirect_uri.is_empty() || redirect_uri.contains('#') {
        return error_as_json(error);
    }
    let _ = state;
    Redirect::temporary(&authorization::error_redirect(redirect_uri, error.error_code(), oauth_state)).into_response()
}

// ============================================================================
// POST /consent (C5)
// ============================================================================

pub async fn consent_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(decision): Json<ConsentDecision>,
) -> Response {
    let session = match resolve_session(&state, &headers).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(crate::dto::oauth::OAuthErrorResponse::new("authentication_required", None)),
            )
                .into_response()
        }
        Err(e) => return e.into_response(),
    };

    let client = match authorization::revalidate_consent_decision(
        &state.clients,
        &decision,
        state.config.app_id,
        state.config.environment_id,
        state.config.organization_id,
    )
    .await
    {
        Ok(client) => client,
        Err(e) => return error_response(&state, &decision.redirect_uri, &e, decision.state.as_deref()).await,
    };

    if decision.action == ConsentAction::Deny {
        state
            .audit
            .create(OAuthEventType::ConsentDenied, Some(client.id), Some(session.user_id), None, None)
            .await
            .ok();
        return Redirect::temporary(&authorization::error_redirect(
            &decision.redirect_uri,
            "access_denied",
            decision.state.as_deref(),
        ))
        .into_response();
    }

    if client.require_consent && !client.trusted_client {
        if let Err(e) = state.consent.grant(session.user_id, client.id, &decision.scopes, None).await {
            return error_response(&state, &decision.redirect_uri, &e, decision.state.as_deref()).await;
        }
        state
            .audit
            .create(OAuthEventType::ConsentGranted, Some(client.id), Some(session.user_id), None, None)
            .await
            .ok();
    }

    issue_code_and_redirect(
        &state,
        &client,
        session.user_id,
        Some(session.id),
        &decision.redirect_uri,
        &decision.scopes,
        decision.code_challenge.as_deref(),
        decision.code_challenge_method.as_deref(),
        decision.nonce.as_deref(),
        decision.state.as_deref(),
    )
    .await
}

// ============================================================================
// POST /token (C7)
// ============================================================================

pub async fn token_handler(State(state): State<AppState>, headers: HeaderMap, Form(req): Form<TokenRequest>) -> Response {
    match token_handler_inner(&state, &headers, &req).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn token_handler_inner(
    state: &AppState,
    headers: &HeaderMap,
    req: &TokenRequest,
) -> Result<crate::dto::oauth::OAuthTokenResponse, OAuthError> {
    let client_auth = crate::services::client_auth::ClientAuthenticator::new(state.clients.clone());
    let client = client_auth.authenticate(headers, req.client_id.as_deref(), req.client_secret.as_deref()).await?;
    client_auth.authorize_for_endpoint(&client, Endpoint::Token)?;

    let response = match req.grant_type.as_str() {
        "authorization_code" => token_endpoint::authorization_code_grant(state, &client, req).await?,
        "refresh_token" => token_endpoint::refresh_token_grant(state, &client, req).await?,
        "client_credentials" => token_endpoint::client_credentials_grant(state, &client, req).await?,
        "urn:ietf:params:oauth:grant-type:device_code" => token_endpoint::device_code_grant(state, &client, req).await?,
        _ => return Err(OAuthError::UnsupportedGrantType),
    };

    state
        .audit
        .create(OAuthEventType::TokenIssued, Some(client.id), None, None, Some(serde_json::json!({ "grant_type": req.grant_type })))
        .await
        .ok();

    Ok(response)
}

// ============================================================================
// POST /introspect (C9, RFC 7662)
// ============================================================================

pub async fn introspect_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(req): Form<IntrospectionRequest>,
) -> Response {
    match introspect_inner(&state, &headers, &req).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn introspect_inner(
    state: &AppState,
    headers: &HeaderMap,
    req: &IntrospectionRequest,
) -> Result<crate::dto::oauth::IntrospectionResponse, OAuthError> {
    let client_auth = crate::services::client_auth::ClientAuthenticator::new(state.clients.clone());
    let client = client_auth.authenticate(headers, req.client_id.as_deref(), req.client_secret.as_deref()).await?;
    client_auth.authorize_for_endpoint(&client, Endpoint::Introspect)?;

    introspection::introspect(state, &client.client_id, req).await
}

// ============================================================================
// POST /revoke (C10, RFC 7009)
// ============================================================================

pub async fn revoke_handler(State(state): State<AppState>, headers: HeaderMap, Form(req): Form<RevokeRequest>) -> Response {
    let client_auth = crate::services::client_auth::ClientAuthenticator::new(state.clients.clone());
    let client = match client_auth.authenticate(&headers, req.client_id.as_deref(), req.client_secret.as_deref()).await {
        Ok(client) => client,
        // RFC 7009 §2.1: an invalid client still gets a definitive error, but
        // revocation itself never discloses token existence to anyone else.
        Err(e) => return e.into_response(),
    };

    if let Err(e) = revocation::revoke(&state, &client.client_id, &req).await {
        tracing::warn!(error = %e, client_id = %client.client_id, "token revocation failed");
    } else {
        state.audit.create(OAuthEventType::TokenRevoked, Some(client.id), None, None, None).await.ok();
    }

    (StatusCode::OK, Json(crate::dto::oauth::RevokeResponse::default())).into_response()
}

// ============================================================================
// GET /userinfo (C13)
// ============================================================================

pub async fn userinfo_handler(State(state): State<AppState>, Extension(token): Extension<AuthenticatedToken>) -> Response {
    match userinfo::userinfo(&state, &token.claims).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response(),
    }
}

// ============================================================================
// POST /register (C3, RFC 7591)
// ============================================================================

pub async fn register_client_handler(State(state): State<AppState>, Json(req): Json<ClientRegistrationRequest>) -> Response {
    match client_registry::register_client(
        &state.clients,
        &req,
        state.config.app_id,
        state.config.environment_id,
        state.config.organization_id,
    )
    .await
    {
        Ok((client, plaintext_secret)) => {
            state
                .audit
                .create(
                    OAuthEventType::ClientRegistered,
                    Some(client.id),
                    None,
                    None,
                    Some(serde_json::json!({ "application_type": client.application_type.as_str() })),
                )
                .await
                .ok();
            (StatusCode::CREATED, Json(client_registry::registration_response(&client, plaintext_secret))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

// ============================================================================
// POST /device_authorization (C11, RFC 8628)
// ============================================================================

pub async fn device_authorization_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(req): Form<DeviceAuthorizationRequest>,
) -> Response {
    match device_authorization_inner(&state, &headers, &req).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn device_authorization_inner(
    state: &AppState,
    headers: &HeaderMap,
    req: &DeviceAuthorizationRequest,
) -> Result<crate::dto::oauth::DeviceAuthorizationResponse, OAuthError> {
    if !state.config.device_flow.enabled {
        return Err(OAuthError::FeatureDisabled("Device authorization grant is disabled".to_string()));
    }

    let client_auth = crate::services::client_auth::ClientAuthenticator::new(state.clients.clone());
    let client = client_auth.authenticate(headers, Some(&req.client_id), req.client_secret.as_deref()).await?;

    let scopes = req.scopes();
    for scope in &scopes {
        if !client.allows_scope(scope) {
            return Err(OAuthError::InvalidScope(format!("scope '{}' is not allowed for this client", scope)));
        }
    }

    let (response, _device_code_plain) = state.device_flow.initiate(client.id, &scopes).await?;

    state
        .audit
        .create(OAuthEventType::AuthorizationRequested, Some(client.id), None, None, Some(serde_json::json!({ "flow": "device" })))
        .await
        .ok();

    Ok(response)
}

// ============================================================================
// GET /device, POST /device/verify, POST /device/authorize (C11)
// ============================================================================

pub async fn device_verify_page_handler(
    State(state): State<AppState>,
    Query(req): Query<DeviceVerifyRequest>,
    headers: HeaderMap,
) -> Response {
    if resolve_session(&state, &headers).await.ok().flatten().is_none() {
        return authentication_required_json(&state);
    }

    match &req.user_code {
        None => (StatusCode::OK, Json(serde_json::json!({ "status": "enter_code" }))).into_response(),
        Some(code) => device_lookup_response(&state, code).await,
    }
}

pub async fn device_verify_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<DeviceVerifyRequest>,
) -> Response {
    if resolve_session(&state, &headers).await.ok().flatten().is_none() {
        return authentication_required_json(&state);
    }

    match &req.user_code {
        Some(code) => device_lookup_response(&state, code).await,
        None => OAuthError::InvalidRequest("user_code is required".to_string()).into_response(),
    }
}

async fn device_lookup_response(state: &AppState, user_code: &str) -> Response {
    let device = match state.device_flow.find_for_verification(user_code).await {
        Ok(Some(device)) => device,
        Ok(None) => return (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "invalid_grant" }))).into_response(),
        Err(e) => return e.into_response(),
    };

    let client = match state.clients.find_by_id(device.client_id).await {
        Ok(Some(client)) => client,
        Ok(None) => return OAuthError::InvalidClient.into_response(),
        Err(e) => return e.into_response(),
    };

    let rows = state.scopes.find_by_codes(&device.scopes).await.unwrap_or_default();
    let descriptions: HashMap<String, String> = rows.into_iter().map(|s| (s.code, s.description)).collect();

    Json(ConsentScreenInfo {
        client_name: client.name,
        scopes: authorization::scope_infos(&device.scopes, &descriptions),
        redirect_uri: String::new(),
        state: None,
    })
    .into_response()
}

pub async fn device_authorize_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<DeviceApprovalRequest>,
) -> Response {
    let session = match resolve_session(&state, &headers).await {
        Ok(Some(session)) => session,
        Ok(None) => return authentication_required_json(&state),
        Err(e) => return e.into_response(),
    };

    let result = match req.action {
        ConsentAction::Allow => state.device_flow.authorize(&req.user_code, session.user_id, Some(session.id)).await,
        ConsentAction::Deny => state.device_flow.deny(&req.user_code).await,
    };

    match result {
        Ok(true) => {
            let status = if req.action == ConsentAction::Allow { "authorized" } else { "denied" };
            (StatusCode::OK, Json(DeviceApprovalResponse { status })).into_response()
        }
        Ok(false) => OAuthError::InvalidGrant("device code is not awaiting verification".to_string()).into_response(),
        Err(e) => e.into_response(),
    }
}

fn authentication_required_json(state: &AppState) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(AuthenticationRequiredResponse { error: "authentication_required", login_url: state.config.login_url.clone() }),
    )
        .into_response()
}

// ============================================================================
// Helper: render an OAuthError as a JSON body without consuming it, for the
// authorize flow's can't-redirect-so-surface-JSON-instead branch.
// ============================================================================

fn error_as_json(error: &OAuthError) -> Response {
    let status = error.status_code();
    let body = Json(crate::dto::oauth::OAuthErrorResponse::from(error));
    (status, body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extracts_authsome_session_cookie_first() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("session_token=legacy; authsome_session=current"),
        );
        assert_eq!(extract_session_token(&headers), Some("current".to_string()));
    }

    #[test]
    fn falls_back_to_legacy_session_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::COOKIE, HeaderValue::from_static("session_token=legacy"));
        assert_eq!(extract_session_token(&headers), Some("legacy".to_string()));
    }

    #[test]
    fn falls_back_to_bearer_header_when_no_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer sess-123"));
        assert_eq!(extract_session_token(&headers), Some("sess-123".to_string()));
    }
}
