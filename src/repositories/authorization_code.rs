use chrono::{DateTime, Duration, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::authorization_code::CodeChallengeMethod;
use crate::models::AuthorizationCode;

const SELECT_COLUMNS: &str = r#"
    id, code_hash, client_id, user_id, session_id, redirect_uri, scopes,
    code_challenge, code_challenge_method, nonce, auth_time, expires_at,
    used_at, created_at
"#;

const MAX_EXPIRATION_SECONDS: i64 = 600;

#[derive(Clone)]
pub struct AuthorizationCodeRepository {
    pool: MySqlPool,
}

impl AuthorizationCodeRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        code_hash: &str,
        client_id: Uuid,
        user_id: Uuid,
        session_id: Option<Uuid>,
        redirect_uri: &str,
        scopes: &[String],
        code_challenge: &str,
        code_challenge_method: CodeChallengeMethod,
        nonce: Option<&str>,
        auth_time: DateTime<Utc>,
        expires_in_seconds: i64,
    ) -> Result<AuthorizationCode, OAuthError> {
        let actual_expiration = expires_in_seconds.min(MAX_EXPIRATION_SECONDS);
        let id = Uuid::new_v4();
        let expires_at = Utc::now() + Duration::seconds(actual_expiration);
        let scopes_json = serde_json::to_value(scopes)
            .map_err(|e| OAuthError::ServerError(format!("Failed to serialize scopes: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO oauth_authorization_codes
            (id, code_hash, client_id, user_id, session_id, redirect_uri, scopes,
             code_challenge, code_challenge_method, nonce, auth_time, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(code_hash)
        .bind(client_id.to_string())
        .bind(user_id.to_string())
        .bind(session_id.map(|s| s.to_string()))
        .bind(redirect_uri)
        .bind(&scopes_json)
        .bind(code_challenge)
        .bind(code_challenge_method.as_str())
        .bind(nonce)
        .bind(auth_time)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| OAuthError::ServerError("Failed to fetch created authorization code".to_string()))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<AuthorizationCode>, OAuthError> {
        let code = sqlx::query_as::<_, AuthorizationCode>(&format!(
            "SELECT {} FROM oauth_authorization_codes WHERE id = ?",
            SELECT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(code)
    }

    pub async fn find_by_code_hash(&self, code_hash: &str) -> Result<Option<AuthorizationCode>, OAuthError> {
        let code = sqlx::query_as::<_, AuthorizationCode>(&format!(
            "SELECT {} FROM oauth_authorization_codes WHERE code_hash = ?",
            SELECT_COLUMNS
        ))
        .bind(code_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(code)
    }

    pub async fn find_valid_by_code_hash(&self, code_hash: &str) -> Result<Option<AuthorizationCode>, OAuthError> {
        let code = sqlx::query_as::<_, AuthorizationCode>(&format!(
            "SELECT {} FROM oauth_authorization_codes WHERE code_hash = ? AND used_at IS NULL AND expires_at > NOW()",
            SELECT_COLUMNS
        ))
        .bind(code_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(code)
    }

    /// Atomically claims the code for the token endpoint. The `used_at IS
    /// NULL` guard means two concurrent redemption attempts for the same
    /// code - a classic authorization-code-interception race - can't both
    /// succeed; whichever commits first wins and the loser sees 0 rows
    /// affected.
    pub async fn mark_as_used(&self, id: Uuid) -> Result<(), OAuthError> {
        let result = sqlx::query(
            "UPDATE oauth_authorization_codes SET used_at = NOW() WHERE id = ? AND used_at IS NULL",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(OAuthError::InvalidGrant("Authorization code already used or not found".to_string()));
        }

        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), OAuthError> {
        let result = sqlx::query("DELETE FROM oauth_authorization_codes WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(OAuthError::InvalidGrant("Authorization code not found".to_string()));
        }

        Ok(())
    }

    pub async fn delete_expired(&self) -> Result<u64, OAuthError> {
        let result = sqlx::query("DELETE FROM oauth_authorization_codes WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(result.rows_affected())
    }

    pub async fn delete_used(&self) -> Result<u64, OAuthError> {
        let result = sqlx::query("DELETE FROM oauth_authorization_codes WHERE used_at IS NOT NULL")
            .execute(&self.pool)
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(result.rows_affected())
    }

    pub async fn delete_for_user_client(&self, user_id: Uuid, client_id: Uuid) -> Result<u64, OAuthError> {
        let result = sqlx::query("DELETE FROM oauth_authorization_codes WHERE user_id = ? AND client_id = ?")
            .bind(user_id.to_string())
            .bind(client_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(result.rows_affected())
    }
}
