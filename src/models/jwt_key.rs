use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One RSA keypair in the signing key's rotation history. `private_pem` is
/// never serialized out of the process - it exists only so `KeyManager` can
/// restore its durable backend across restarts, and only the public half
/// ever crosses an HTTP boundary via the JWKS endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtKey {
    pub id: Uuid,
    pub kid: String,
    #[serde(skip_serializing)]
    pub private_pem: String,
    pub public_pem: String,
    pub algorithm: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub retire_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct JwtKeyRow {
    pub id: String,
    pub kid: String,
    pub private_pem: String,
    pub public_pem: String,
    pub algorithm: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub retire_at: Option<DateTime<Utc>>,
}

impl From<JwtKeyRow> for JwtKey {
    fn from(row: JwtKeyRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            kid: row.kid,
            private_pem: row.private_pem,
            public_pem: row.public_pem,
            algorithm: row.algorithm,
            is_active: row.is_active,
            created_at: row.created_at,
            retire_at: row.retire_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for JwtKey {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        let key_row = JwtKeyRow::from_row(row)?;
        Ok(JwtKey::from(key_row))
    }
}

impl JwtKey {
    /// A key is still valid for verification once its retirement window has
    /// elapsed, it is simply dropped - but right up to `retire_at` it remains
    /// a legitimate signature source for tokens minted just before rotation.
    pub fn is_retired(&self) -> bool {
        self.retire_at.map(|r| Utc::now() > r).unwrap_or(false)
    }
}
