//! Narrow stand-in for the platform's session service. Session issuance and
//! expiry belong to the login subsystem (out of scope here); the core only
//! ever needs to resolve a bearer/cookie session token to a `(session_id,
//! user_id)` pair when deciding whether `/authorize` and `/device` already
//! have an authenticated end user. Logout-propagation to issued tokens is the
//! session subsystem's job, calling back into `OAuthTokenRepository::revoke_by_session`.

use sqlx::{FromRow, MySqlPool};
use uuid::Uuid;

use crate::error::OAuthError;

#[derive(Debug, Clone, FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
}

#[derive(Debug, Clone, Copy)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
}

#[derive(Clone)]
pub struct SessionDirectory {
    pool: MySqlPool,
}

impl SessionDirectory {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_token(&self, token: &str) -> Result<Option<Session>, OAuthError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, user_id
            FROM sessions
            WHERE session_token = ? AND (expires_at IS NULL OR expires_at > NOW())
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(row.map(|row| Session {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            user_id: Uuid::parse_str(&row.user_id).unwrap_or_default(),
        }))
    }
}
