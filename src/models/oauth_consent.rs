use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Consent - a durable record that a user approved a client for a set of
/// scopes, used to skip the consent screen on subsequent authorization
/// requests that don't ask for anything new.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConsent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub client_id: Uuid,
    pub scopes: Vec<String>,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct OAuthConsentRow {
    pub id: String,
    pub user_id: String,
    pub client_id: String,
    pub scopes: serde_json::Value,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<OAuthConsentRow> for OAuthConsent {
    fn from(row: OAuthConsentRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            user_id: Uuid::parse_str(&row.user_id).unwrap_or_default(),
            client_id: Uuid::parse_str(&row.client_id).unwrap_or_default(),
            scopes: serde_json::from_value(row.scopes).unwrap_or_default(),
            granted_at: row.granted_at,
            expires_at: row.expires_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for OAuthConsent {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        let consent_row = OAuthConsentRow::from_row(row)?;
        Ok(OAuthConsent::from(consent_row))
    }
}

impl OAuthConsent {
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|exp| Utc::now() > exp).unwrap_or(false)
    }

    /// Consent covers a request only if it isn't expired and grants every
    /// scope being asked for - a superset of previously-granted scopes still
    /// requires a fresh consent screen for the newly-requested ones.
    pub fn covers_scopes(&self, requested_scopes: &[String]) -> bool {
        !self.is_expired() && requested_scopes.iter().all(|scope| self.scopes.contains(scope))
    }
}
