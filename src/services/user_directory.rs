//! Narrow stand-in for the platform's user directory. The directory itself
//! (lookup by id/email, password authentication) is an out-of-scope
//! collaborator owned by a separate subsystem; this crate only ever needs
//! `find_by_id` to populate ID token / userinfo claims, so that's the entire
//! surface exposed here. The `users` table is read, never migrated, by this
//! crate.

use sqlx::{FromRow, MySqlPool};
use uuid::Uuid;

use crate::error::OAuthError;
use crate::utils::jwt::IdentityClaims;

#[derive(Debug, Clone, FromRow)]
struct UserRow {
    id: String,
    email: Option<String>,
    email_verified: bool,
    name: Option<String>,
    preferred_username: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
}

/// The subset of a user record this OIDC core ever needs.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: Option<String>,
    pub email_verified: bool,
    pub name: Option<String>,
    pub preferred_username: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
}

impl From<UserRecord> for IdentityClaims {
    fn from(user: UserRecord) -> Self {
        IdentityClaims {
            preferred_username: user.preferred_username,
            email: user.email,
            email_verified: Some(user.email_verified),
            name: user.name,
            given_name: user.given_name,
            family_name: user.family_name,
        }
    }
}

#[derive(Clone)]
pub struct UserDirectory {
    pool: MySqlPool,
}

impl UserDirectory {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserRecord>, OAuthError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, email_verified, name, preferred_username, given_name, family_name
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(row.map(|row| UserRecord {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            email: row.email,
            email_verified: row.email_verified,
            name: row.name,
            preferred_username: row.preferred_username,
            given_name: row.given_name,
            family_name: row.family_name,
        }))
    }
}
