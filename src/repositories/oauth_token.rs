use chrono::{DateTime, Duration, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::OAuthToken;

const SELECT_COLUMNS: &str = r#"
    id, jti, user_id, client_id, session_id, access_token_hash, refresh_token_hash,
    scopes, issuer, audience, auth_time, acr, amr, not_before, expires_at,
    refresh_expires_at, revoked, created_at
"#;

#[derive(Clone)]
pub struct OAuthTokenRepository {
    pool: MySqlPool,
}

/// Inputs for minting a new access/refresh token pair, grouped for the same
/// reason `NewOAuthClient` is: too many positional arguments to read at the
/// call site otherwise.
pub struct NewOAuthToken<'a> {
    pub jti: &'a str,
    pub user_id: Option<Uuid>,
    pub client_id: Uuid,
    pub session_id: Option<Uuid>,
    pub access_token_hash: &'a str,
    pub refresh_token_hash: Option<&'a str>,
    pub scopes: &'a [String],
    pub issuer: &'a str,
    pub audience: &'a str,
    pub auth_time: Option<DateTime<Utc>>,
    pub acr: Option<&'a str>,
    pub amr: &'a [String],
    pub access_expires_in_seconds: i64,
    pub refresh_expires_in_seconds: Option<i64>,
}

impl OAuthTokenRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new_token: NewOAuthToken<'_>) -> Result<OAuthToken, OAuthError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let expires_at = now + Duration::seconds(new_token.access_expires_in_seconds);
        let refresh_expires_at = new_token
            .refresh_expires_in_seconds
            .map(|secs| now + Duration::seconds(secs));
        let scopes_json = serde_json::to_value(new_token.scopes)
            .map_err(|e| OAuthError::ServerError(format!("Failed to serialize scopes: {}", e)))?;
        let amr_json = serde_json::to_value(new_token.amr)
            .map_err(|e| OAuthError::ServerError(format!("Failed to serialize amr: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO oauth_tokens
            (id, jti, user_id, client_id, session_id, access_token_hash, refresh_token_hash,
             scopes, issuer, audience, auth_time, acr, amr, not_before, expires_at, refresh_expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(new_token.jti)
        .bind(new_token.user_id.map(|u| u.to_string()))
        .bind(new_token.client_id.to_string())
        .bind(new_token.session_id.map(|s| s.to_string()))
        .bind(new_token.access_token_hash)
        .bind(new_token.refresh_token_hash)
        .bind(&scopes_json)
        .bind(new_token.issuer)
        .bind(new_token.audience)
        .bind(new_token.auth_time)
        .bind(new_token.acr)
        .bind(&amr_json)
        .bind(now)
        .bind(expires_at)
        .bind(refresh_expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| OAuthError::ServerError("Failed to fetch created token".to_string()))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<OAuthToken>, OAuthError> {
        let token = sqlx::query_as::<_, OAuthToken>(&format!(
            "SELECT {} FROM oauth_tokens WHERE id = ?",
            SELECT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(token)
    }

    pub async fn find_by_jti(&self, jti: &str) -> Result<Option<OAuthToken>, OAuthError> {
        let token = sqlx::query_as::<_, OAuthToken>(&format!(
            "SELECT {} FROM oauth_tokens WHERE jti = ?",
            SELECT_COLUMNS
        ))
        .bind(jti)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(token)
    }

    pub async fn find_by_access_token_hash(&self, access_token_hash: &str) -> Result<Option<OAuthToken>, OAuthError> {
        let token = sqlx::query_as::<_, OAuthToken>(&format!(
            "SELECT {} FROM oauth_tokens WHERE access_token_hash = ?",
            SELECT_COLUMNS
        ))
        .bind(access_token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(token)
    }

    pub async fn find_valid_by_access_token_hash(&self, access_token_hash: &str) -> Result<Option<OAuthToken>, OAuthError> {
        let token = sqlx::query_as::<_, OAuthToken>(&format!(
            "SELECT {} FROM oauth_tokens WHERE access_token_hash = ? AND revoked = false AND expires_at > NOW()",
            SELECT_COLUMNS
        ))
        .bind(access_token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(token)
    }

    pub async fn find_by_refresh_token_hash(&self, refresh_token_hash: &str) -> Result<Option<OAuthToken>, OAuthError> {
        let token = sqlx::query_as::<_, OAuthToken>(&format!(
            "SELECT {} FROM oauth_tokens WHERE refresh_token_hash = ?",
            SELECT_COLUMNS
        ))
        .bind(refresh_token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(token)
    }

    /// Refresh tokens carry their own `refresh_expires_at`, so validity here
    /// is independent of the paired access token's lifetime.
    pub async fn find_valid_by_refresh_token_hash(&self, refresh_token_hash: &str) -> Result<Option<OAuthToken>, OAuthError> {
        let token = sqlx::query_as::<_, OAuthToken>(&format!(
            r#"SELECT {} FROM oauth_tokens
               WHERE refresh_token_hash = ? AND revoked = false
                 AND (refresh_expires_at IS NULL OR refresh_expires_at > NOW())"#,
            SELECT_COLUMNS
        ))
        .bind(refresh_token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(token)
    }

    /// Rotates a refresh token: the old token row is revoked and a new
    /// access/refresh pair is inserted, both inside one transaction and
    /// gated on the old row still being un-revoked at the time of the
    /// update, so a replayed refresh token can't win a race against the
    /// legitimate rotation and mint a second token pair.
    pub async fn rotate(
        &self,
        old_id: Uuid,
        new_token: NewOAuthToken<'_>,
    ) -> Result<OAuthToken, OAuthError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        let result = sqlx::query("UPDATE oauth_tokens SET revoked = true WHERE id = ? AND revoked = false")
            .bind(old_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(OAuthError::InvalidGrant("Refresh token already used".to_string()));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let expires_at = now + Duration::seconds(new_token.access_expires_in_seconds);
        let refresh_expires_at = new_token
            .refresh_expires_in_seconds
            .map(|secs| now + Duration::seconds(secs));
        let scopes_json = serde_json::to_value(new_token.scopes)
            .map_err(|e| OAuthError::ServerError(format!("Failed to serialize scopes: {}", e)))?;
        let amr_json = serde_json::to_value(new_token.amr)
            .map_err(|e| OAuthError::ServerError(format!("Failed to serialize amr: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO oauth_tokens
            (id, jti, user_id, client_id, session_id, access_token_hash, refresh_token_hash,
             scopes, issuer, audience, auth_time, acr, amr, not_before, expires_at, refresh_expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(new_token.jti)
        .bind(new_token.user_id.map(|u| u.to_string()))
        .bind(new_token.client_id.to_string())
        .bind(new_token.session_id.map(|s| s.to_string()))
        .bind(new_token.access_token_hash)
        .bind(new_token.refresh_token_hash)
        .bind(&scopes_json)
        .bind(new_token.issuer)
        .bind(new_token.audience)
        .bind(new_token.auth_time)
        .bind(new_token.acr)
        .bind(&amr_json)
        .bind(now)
        .bind(expires_at)
        .bind(refresh_expires_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| OAuthError::ServerError("Failed to fetch rotated token".to_string()))
    }

    pub async fn revoke(&self, id: Uuid) -> Result<(), OAuthError> {
        let result = sqlx::query("UPDATE oauth_tokens SET revoked = true WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(OAuthError::InvalidGrant("Token not found".to_string()));
        }

        Ok(())
    }

    pub async fn revoke_by_access_token_hash(&self, access_token_hash: &str) -> Result<(), OAuthError> {
        let result = sqlx::query("UPDATE oauth_tokens SET revoked = true WHERE access_token_hash = ?")
            .bind(access_token_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(OAuthError::InvalidGrant("Token not found".to_string()));
        }

        Ok(())
    }

    pub async fn revoke_by_refresh_token_hash(&self, refresh_token_hash: &str) -> Result<(), OAuthError> {
        let result = sqlx::query("UPDATE oauth_tokens SET revoked = true WHERE refresh_token_hash = ?")
            .bind(refresh_token_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(OAuthError::InvalidGrant("Token not found".to_string()));
        }

        Ok(())
    }

    pub async fn revoke_by_jti(&self, jti: &str) -> Result<(), OAuthError> {
        let result = sqlx::query("UPDATE oauth_tokens SET revoked = true WHERE jti = ?")
            .bind(jti)
            .execute(&self.pool)
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(OAuthError::InvalidGrant("Token not found".to_string()));
        }

        Ok(())
    }

    pub async fn revoke_by_session(&self, session_id: Uuid) -> Result<u64, OAuthError> {
        let result = sqlx::query("UPDATE oauth_tokens SET revoked = true WHERE session_id = ? AND revoked = false")
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(result.rows_affected())
    }

    pub async fn revoke_all_for_user_client(&self, user_id: Uuid, client_id: Uuid) -> Result<u64, OAuthError> {
        let result = sqlx::query(
            "UPDATE oauth_tokens SET revoked = true WHERE user_id = ? AND client_id = ? AND revoked = false",
        )
        .bind(user_id.to_string())
        .bind(client_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(result.rows_affected())
    }

    /// Used by client deletion: every token tied to the client, user-bound
    /// or not, must stop validating once the client is gone.
    pub async fn revoke_all_for_client(&self, client_id: Uuid) -> Result<u64, OAuthError> {
        let result = sqlx::query(
            "UPDATE oauth_tokens SET revoked = true WHERE client_id = ? AND revoked = false",
        )
        .bind(client_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(result.rows_affected())
    }

    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, OAuthError> {
        let result = sqlx::query("UPDATE oauth_tokens SET revoked = true WHERE user_id = ? AND revoked = false")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(result.rows_affected())
    }

    pub async fn is_revoked(&self, id: Uuid) -> Result<bool, OAuthError> {
        let revoked = sqlx::query_scalar::<_, bool>("SELECT revoked FROM oauth_tokens WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(revoked.unwrap_or(true))
    }

    pub async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<OAuthToken>, OAuthError> {
        let tokens = sqlx::query_as::<_, OAuthToken>(&format!(
            "SELECT {} FROM oauth_tokens WHERE user_id = ? ORDER BY created_at DESC",
            SELECT_COLUMNS
        ))
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(tokens)
    }

    pub async fn list_active_for_user_client(
        &self,
        user_id: Uuid,
        client_id: Uuid,
    ) -> Result<Vec<OAuthToken>, OAuthError> {
        let tokens = sqlx::query_as::<_, OAuthToken>(&format!(
            "SELECT {} FROM oauth_tokens WHERE user_id = ? AND client_id = ? AND revoked = false ORDER BY created_at DESC",
            SELECT_COLUMNS
        ))
        .bind(user_id.to_string())
        .bind(client_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(tokens)
    }

    pub async fn delete_expired(&self) -> Result<u64, OAuthError> {
        let result = sqlx::query(
            r#"DELETE FROM oauth_tokens WHERE expires_at < NOW()
               AND (refresh_expires_at IS NULL OR refresh_expires_at < NOW())"#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(result.rows_affected())
    }

    pub async fn delete_revoked(&self) -> Result<u64, OAuthError> {
        let result = sqlx::query("DELETE FROM oauth_tokens WHERE revoked = true")
            .execute(&self.pool)
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(result.rows_affected())
    }

    pub async fn count_all(&self) -> Result<u64, OAuthError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM oauth_tokens")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(count as u64)
    }

    pub async fn count_active(&self) -> Result<u64, OAuthError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM oauth_tokens WHERE revoked = false AND expires_at > NOW()",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(count as u64)
    }
}
