use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The grant that produced a token, kept so the Token Store can answer
/// introspection/cascade questions without re-deriving intent from scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenClass {
    Access,
    Refresh,
}

impl TokenClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenClass::Access => "access",
            TokenClass::Refresh => "refresh",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "access" => Some(Self::Access),
            "refresh" => Some(Self::Refresh),
            _ => None,
        }
    }
}

/// OAuth Token - one row per issued access token, carrying its paired refresh
/// token (if any) so rotation/revocation can act on both atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    pub id: Uuid,
    pub jti: String,
    pub user_id: Option<Uuid>,
    pub client_id: Uuid,
    pub session_id: Option<Uuid>,
    #[serde(skip_serializing)]
    pub access_token_hash: String,
    #[serde(skip_serializing)]
    pub refresh_token_hash: Option<String>,
    pub scopes: Vec<String>,
    pub issuer: String,
    pub audience: String,
    pub auth_time: Option<DateTime<Utc>>,
    pub acr: Option<String>,
    pub amr: Vec<String>,
    pub not_before: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub refresh_expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct OAuthTokenRow {
    pub id: String,
    pub jti: String,
    pub user_id: Option<String>,
    pub client_id: String,
    pub session_id: Option<String>,
    pub access_token_hash: String,
    pub refresh_token_hash: Option<String>,
    pub scopes: serde_json::Value,
    pub issuer: String,
    pub audience: String,
    pub auth_time: Option<DateTime<Utc>>,
    pub acr: Option<String>,
    pub amr: serde_json::Value,
    pub not_before: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub refresh_expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl From<OAuthTokenRow> for OAuthToken {
    fn from(row: OAuthTokenRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            jti: row.jti,
            user_id: row.user_id.and_then(|id| Uuid::parse_str(&id).ok()),
            client_id: Uuid::parse_str(&row.client_id).unwrap_or_default(),
            session_id: row.session_id.and_then(|id| Uuid::parse_str(&id).ok()),
            access_token_hash: row.access_token_hash,
            refresh_token_hash: row.refresh_token_hash,
            scopes: serde_json::from_value(row.scopes).unwrap_or_default(),
            issuer: row.issuer,
            audience: row.audience,
            auth_time: row.auth_time,
            acr: row.acr,
            amr: serde_json::from_value(row.amr).unwrap_or_default(),
            not_before: row.not_before,
            expires_at: row.expires_at,
            refresh_expires_at: row.refresh_expires_at,
            revoked: row.revoked,
            created_at: row.created_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for OAuthToken {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        let token_row = OAuthTokenRow::from_row(row)?;
        Ok(OAuthToken::from(token_row))
    }
}

impl OAuthToken {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        !self.revoked && !self.is_expired()
    }

    /// The refresh token on this row is usable until its own expiry, not the
    /// access token's - they're issued together but age independently.
    pub fn is_refresh_valid(&self) -> bool {
        if self.revoked || self.refresh_token_hash.is_none() {
            return false;
        }
        match self.refresh_expires_at {
            Some(exp) => Utc::now() <= exp,
            None => true,
        }
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    pub fn has_all_scopes(&self, required_scopes: &[String]) -> bool {
        required_scopes.iter().all(|scope| self.has_scope(scope))
    }
}
