//! Wire contracts for the OAuth2/OpenID Connect endpoints.
//!
//! Follows RFC 6749 (OAuth 2.0), RFC 7636 (PKCE), RFC 7662 (Introspection),
//! RFC 7009 (Revocation), RFC 7591 (Dynamic Client Registration) and
//! RFC 8628 (Device Authorization Grant).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Authorization Request/Response - GET /authorize
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationRequest {
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scope: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub max_age: Option<i64>,
    pub prompt: Option<String>,
}

impl AuthorizationRequest {
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_ref()
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationResponse {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Returned when no user session exists and the caller is in API mode
/// rather than browser-redirect mode.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticationRequiredResponse {
    pub error: &'static str,
    pub login_url: String,
}

// ============================================================================
// Consent - POST /consent
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ConsentDecision {
    pub action: ConsentAction,
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub nonce: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentAction {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScopeInfo {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsentScreenInfo {
    pub client_name: String,
    pub scopes: Vec<ScopeInfo>,
    pub redirect_uri: String,
    pub state: Option<String>,
}

// ============================================================================
// Token Request/Response - POST /token
// ============================================================================

/// A single struct covering every grant type's parameters, since the token
/// endpoint reads a form body and dispatches on `grant_type` at runtime
/// rather than at the deserializer.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    // authorization_code
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    // client_credentials / authorization_code / refresh_token
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    // refresh_token
    pub refresh_token: Option<String>,
    // client_credentials / refresh_token (narrowing)
    pub scope: Option<String>,
    // device_code
    pub device_code: Option<String>,
}

impl TokenRequest {
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_ref()
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokenResponse {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub token_type: String,
    pub expires_in: i64,
    pub scope: String,
}

impl OAuthTokenResponse {
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        id_token: Option<String>,
        expires_in: i64,
        scopes: &[String],
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            id_token,
            token_type: "Bearer".to_string(),
            expires_in,
            scope: scopes.join(" "),
        }
    }
}

// ============================================================================
// Introspection - POST /introspect (RFC 7662)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct IntrospectionRequest {
    pub token: String,
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl IntrospectionResponse {
    pub fn inactive() -> Self {
        Self::default()
    }
}

// ============================================================================
// Revocation - POST /revoke (RFC 7009)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RevokeRequest {
    pub token: String,
    #[serde(default)]
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevokeResponse {
    pub status: &'static str,
}

impl Default for RevokeResponse {
    fn default() -> Self {
        Self { status: "revoked" }
    }
}

// ============================================================================
// UserInfo - GET /userinfo
// ============================================================================

#[derive(Debug, Clone, Serialize, Default)]
pub struct UserInfoResponse {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
}

// ============================================================================
// Discovery - GET /.well-known/openid-configuration
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub revocation_endpoint: String,
    pub introspection_endpoint: String,
    pub jwks_uri: String,
    pub registration_endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_authorization_endpoint: Option<String>,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub claims_supported: Vec<String>,
}

// ============================================================================
// JWKS - GET /jwks
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct JwkKey {
    pub kty: &'static str,
    #[serde(rename = "use")]
    pub use_: &'static str,
    pub kid: String,
    pub alg: &'static str,
    pub n: String,
    pub e: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Jwks {
    pub keys: Vec<JwkKey>,
}

// ============================================================================
// Dynamic Client Registration - POST /register (RFC 7591)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ClientRegistrationRequest {
    pub name: String,
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub post_logout_redirect_uris: Vec<String>,
    #[serde(default = "default_application_type")]
    pub application_type: String,
    #[serde(default)]
    pub grant_types: Vec<String>,
    #[serde(default)]
    pub response_types: Vec<String>,
    #[serde(default)]
    pub allowed_scopes: Vec<String>,
    pub token_endpoint_auth_method: Option<String>,
    #[serde(default)]
    pub require_consent: bool,
    #[serde(default)]
    pub trusted_client: bool,
    pub logo_uri: Option<String>,
    pub policy_uri: Option<String>,
    pub tos_uri: Option<String>,
    #[serde(default)]
    pub contacts: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

fn default_application_type() -> String {
    "web".to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientRegistrationResponse {
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub name: String,
    pub redirect_uris: Vec<String>,
    pub token_endpoint_auth_method: String,
    pub require_pkce: bool,
}

// ============================================================================
// Device Authorization Grant (RFC 8628)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceAuthorizationRequest {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
}

impl DeviceAuthorizationRequest {
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_ref()
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceAuthorizationResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: String,
    pub expires_in: i64,
    pub interval: i64,
}

/// GET /device?user_code=... - what the end user types/confirms in a browser.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceVerifyRequest {
    pub user_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceApprovalRequest {
    pub user_code: String,
    pub action: ConsentAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceApprovalResponse {
    pub status: &'static str,
}

// ============================================================================
// OAuth Error Response (RFC 6749 §5.2 / RFC 8628 §3.5)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}

impl OAuthErrorResponse {
    pub fn new(error: &str, description: Option<&str>) -> Self {
        Self {
            error: error.to_string(),
            error_description: description.map(String::from),
            error_uri: None,
        }
    }
}

impl From<&crate::error::OAuthError> for OAuthErrorResponse {
    fn from(error: &crate::error::OAuthError) -> Self {
        let description = match error {
            crate::error::OAuthError::ServerError(_) => None,
            _ => Some(error.to_string()),
        };
        OAuthErrorResponse::new(error.error_code(), description.as_deref())
    }
}

impl From<crate::error::OAuthError> for OAuthErrorResponse {
    fn from(error: crate::error::OAuthError) -> Self {
        OAuthErrorResponse::from(&error)
    }
}
