use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::OAuthConsent;

const SELECT_COLUMNS: &str = "id, user_id, client_id, scopes, granted_at, expires_at";

#[derive(Clone)]
pub struct OAuthConsentRepository {
    pool: MySqlPool,
}

impl OAuthConsentRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Grants or widens consent. A repeat grant for the same user/client pair
    /// replaces the scope set rather than unioning it, so a user who revokes a
    /// scope by re-consenting with a smaller set actually narrows it.
    pub async fn upsert(
        &self,
        user_id: Uuid,
        client_id: Uuid,
        scopes: &[String],
        expires_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<OAuthConsent, OAuthError> {
        let scopes_json = serde_json::to_value(scopes)
            .map_err(|e| OAuthError::ServerError(format!("Failed to serialize scopes: {}", e)))?;
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO oauth_consents (id, user_id, client_id, scopes, granted_at, expires_at)
            VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP, ?)
            ON DUPLICATE KEY UPDATE
                scopes = VALUES(scopes),
                granted_at = CURRENT_TIMESTAMP,
                expires_at = VALUES(expires_at)
            "#,
        )
        .bind(id.to_string())
        .bind(user_id.to_string())
        .bind(client_id.to_string())
        .bind(&scopes_json)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        self.find_by_user_and_client(user_id, client_id)
            .await?
            .ok_or_else(|| OAuthError::ServerError("Failed to fetch upserted consent".to_string()))
    }

    pub async fn find_by_user_and_client(
        &self,
        user_id: Uuid,
        client_id: Uuid,
    ) -> Result<Option<OAuthConsent>, OAuthError> {
        let consent = sqlx::query_as::<_, OAuthConsent>(&format!(
            "SELECT {} FROM oauth_consents WHERE user_id = ? AND client_id = ?",
            SELECT_COLUMNS
        ))
        .bind(user_id.to_string())
        .bind(client_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(consent)
    }

    pub async fn has_consent(
        &self,
        user_id: Uuid,
        client_id: Uuid,
        scopes: &[String],
    ) -> Result<bool, OAuthError> {
        let consent = self.find_by_user_and_client(user_id, client_id).await?;
        Ok(consent.map(|c| c.covers_scopes(scopes)).unwrap_or(false))
    }

    pub async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<OAuthConsent>, OAuthError> {
        let consents = sqlx::query_as::<_, OAuthConsent>(&format!(
            "SELECT {} FROM oauth_consents WHERE user_id = ? ORDER BY granted_at DESC",
            SELECT_COLUMNS
        ))
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(consents)
    }

    pub async fn delete(&self, user_id: Uuid, client_id: Uuid) -> Result<(), OAuthError> {
        sqlx::query("DELETE FROM oauth_consents WHERE user_id = ? AND client_id = ?")
            .bind(user_id.to_string())
            .bind(client_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(())
    }

    pub async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64, OAuthError> {
        let result = sqlx::query("DELETE FROM oauth_consents WHERE user_id = ?")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(result.rows_affected())
    }
}
