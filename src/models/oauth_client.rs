use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Scopes the provider itself recognizes regardless of what a given client
/// registered under `allowed_scopes` (mirrors `discovery::scopes_supported`).
/// A client's effective scope grant is `allowed_scopes ∪ SUPPORTED_SCOPES`
/// (spec.md §4.5 step 5), so a client that never listed `openid`/`profile`/
/// `email` explicitly still gets standard OIDC `/authorize` requests
/// through.
pub const SUPPORTED_SCOPES: &[&str] = &["openid", "profile", "email", "offline_access"];

/// How a client authenticates itself at the token/introspection/revocation endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEndpointAuthMethod {
    ClientSecretBasic,
    ClientSecretPost,
    None,
}

impl TokenEndpointAuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenEndpointAuthMethod::ClientSecretBasic => "client_secret_basic",
            TokenEndpointAuthMethod::ClientSecretPost => "client_secret_post",
            TokenEndpointAuthMethod::None => "none",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "client_secret_basic" => Some(Self::ClientSecretBasic),
            "client_secret_post" => Some(Self::ClientSecretPost),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

/// The kind of application a client represents, per RFC 8252.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationType {
    Web,
    Native,
    Spa,
    Service,
}

impl ApplicationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationType::Web => "web",
            ApplicationType::Native => "native",
            ApplicationType::Spa => "spa",
            ApplicationType::Service => "service",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "web" => Some(Self::Web),
            "native" => Some(Self::Native),
            "spa" => Some(Self::Spa),
            "service" => Some(Self::Service),
            _ => None,
        }
    }
}

/// OAuth Client - a registered application that can request tokens.
///
/// Tenancy is expressed as `app_id`/`environment_id`/`organization_id` rather than
/// a single owning user: clients belong to an application deployed into an
/// environment owned by an organization, matching how registrations are scoped
/// in practice (a client registered for staging is a different row than the
/// same application's production client).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClient {
    pub id: Uuid,
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret_hash: Option<String>,
    pub name: String,
    pub application_type: ApplicationType,
    /// `None` for an app-level client shared across all organizations; `Some`
    /// for an org-specific override. See `find_by_client_id_with_context`.
    pub organization_id: Option<Uuid>,
    pub environment_id: Uuid,
    pub app_id: Uuid,
    pub redirect_uris: Vec<String>,
    pub post_logout_redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub allowed_scopes: Vec<String>,
    pub token_endpoint_auth_method: TokenEndpointAuthMethod,
    pub require_pkce: bool,
    pub require_consent: bool,
    pub trusted_client: bool,
    pub is_internal: bool,
    pub is_active: bool,
    /// Optional RFC 7591 display metadata (`logo_uri`, `policy_uri`, `tos_uri`,
    /// `contacts`), kept as a free-form bag since none of it is security-critical.
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct OAuthClientRow {
    pub id: String,
    pub client_id: String,
    pub client_secret_hash: Option<String>,
    pub name: String,
    pub application_type: String,
    pub organization_id: Option<String>,
    pub environment_id: String,
    pub app_id: String,
    pub redirect_uris: serde_json::Value,
    pub post_logout_redirect_uris: serde_json::Value,
    pub grant_types: serde_json::Value,
    pub response_types: serde_json::Value,
    pub allowed_scopes: serde_json::Value,
    pub token_endpoint_auth_method: String,
    pub require_pkce: bool,
    pub require_consent: bool,
    pub trusted_client: bool,
    pub is_internal: bool,
    pub is_active: bool,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OAuthClientRow> for OAuthClient {
    fn from(row: OAuthClientRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            client_id: row.client_id,
            client_secret_hash: row.client_secret_hash,
            name: row.name,
            application_type: ApplicationType::parse(&row.application_type)
                .unwrap_or(ApplicationType::Web),
            organization_id: row.organization_id.and_then(|o| Uuid::parse_str(&o).ok()),
            environment_id: Uuid::parse_str(&row.environment_id).unwrap_or_default(),
            app_id: Uuid::parse_str(&row.app_id).unwrap_or_default(),
            redirect_uris: serde_json::from_value(row.redirect_uris).unwrap_or_default(),
            post_logout_redirect_uris: serde_json::from_value(row.post_logout_redirect_uris)
                .unwrap_or_default(),
            grant_types: serde_json::from_value(row.grant_types).unwrap_or_default(),
            response_types: serde_json::from_value(row.response_types).unwrap_or_default(),
            allowed_scopes: serde_json::from_value(row.allowed_scopes).unwrap_or_default(),
            token_endpoint_auth_method: TokenEndpointAuthMethod::parse(
                &row.token_endpoint_auth_method,
            )
            .unwrap_or(TokenEndpointAuthMethod::ClientSecretBasic),
            require_pkce: row.require_pkce,
            require_consent: row.require_consent,
            trusted_client: row.trusted_client,
            is_internal: row.is_internal,
            is_active: row.is_active,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for OAuthClient {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        let client_row = OAuthClientRow::from_row(row)?;
        Ok(OAuthClient::from(client_row))
    }
}

impl OAuthClient {
    /// Public clients (RFC 6749 §2.1) have no secret and authenticate with `none`.
    pub fn is_public(&self) -> bool {
        self.token_endpoint_auth_method == TokenEndpointAuthMethod::None
    }

    pub fn is_external(&self) -> bool {
        !self.is_internal
    }

    /// Exact-match redirect URI registration, per RFC 6749 §3.1.2.3.
    pub fn has_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == uri)
    }

    /// True iff `scope` is in `allowed_scopes ∪ SUPPORTED_SCOPES` - an empty
    /// `allowed_scopes` is treated as "no client-specific restriction" (every
    /// provider-supported scope is allowed), per spec.md §4.5 step 5.
    pub fn allows_scope(&self, scope: &str) -> bool {
        self.allowed_scopes.is_empty()
            || self.allowed_scopes.iter().any(|s| s == scope)
            || SUPPORTED_SCOPES.contains(&scope)
    }
}
