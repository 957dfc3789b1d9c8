use chrono::Utc;
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::{DeviceCode, DeviceCodeStatus};

const SELECT_COLUMNS: &str = r#"
    id, device_code_hash, user_code, client_id, scopes, status, user_id, session_id,
    interval_secs, last_polled_at, expires_at, created_at
"#;

#[derive(Clone)]
pub struct DeviceCodeRepository {
    pool: MySqlPool,
}

impl DeviceCodeRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        device_code_hash: &str,
        user_code: &str,
        client_id: Uuid,
        scopes: &[String],
        interval_secs: i64,
        expires_at: chrono::DateTime<Utc>,
    ) -> Result<DeviceCode, OAuthError> {
        let id = Uuid::new_v4();
        let scopes_json = serde_json::to_value(scopes)
            .map_err(|e| OAuthError::ServerError(format!("Failed to serialize scopes: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO device_codes (
                id, device_code_hash, user_code, client_id, scopes, status,
                interval_secs, expires_at
            )
            VALUES (?, ?, ?, ?, ?, 'pending', ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(device_code_hash)
        .bind(user_code)
        .bind(client_id.to_string())
        .bind(&scopes_json)
        .bind(interval_secs)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| OAuthError::ServerError("Failed to fetch created device code".to_string()))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<DeviceCode>, OAuthError> {
        let row = sqlx::query_as::<_, DeviceCode>(&format!(
            "SELECT {} FROM device_codes WHERE id = ?",
            SELECT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(row)
    }

    pub async fn find_by_device_code_hash(
        &self,
        device_code_hash: &str,
    ) -> Result<Option<DeviceCode>, OAuthError> {
        let row = sqlx::query_as::<_, DeviceCode>(&format!(
            "SELECT {} FROM device_codes WHERE device_code_hash = ?",
            SELECT_COLUMNS
        ))
        .bind(device_code_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(row)
    }

    pub async fn find_by_user_code(&self, user_code: &str) -> Result<Option<DeviceCode>, OAuthError> {
        let row = sqlx::query_as::<_, DeviceCode>(&format!(
            "SELECT {} FROM device_codes WHERE user_code = ?",
            SELECT_COLUMNS
        ))
        .bind(user_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(row)
    }

    /// Approves the pending grant on behalf of `user_id`. Conditioned on the
    /// row still being `pending` so a user-code that's already been approved,
    /// denied, or consumed can't be flipped again from a stale browser tab.
    pub async fn authorize(
        &self,
        user_code: &str,
        user_id: Uuid,
        session_id: Option<Uuid>,
    ) -> Result<bool, OAuthError> {
        let result = sqlx::query(
            r#"
            UPDATE device_codes
            SET status = 'authorized', user_id = ?, session_id = ?
            WHERE user_code = ? AND status = 'pending'
            "#,
        )
        .bind(user_id.to_string())
        .bind(session_id.map(|s| s.to_string()))
        .bind(user_code)
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn deny(&self, user_code: &str) -> Result<bool, OAuthError> {
        let result = sqlx::query(
            r#"
            UPDATE device_codes
            SET status = 'denied'
            WHERE user_code = ? AND status = 'pending'
            "#,
        )
        .bind(user_code)
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    /// Atomically claims an `authorized` row for token issuance, moving it to
    /// `consumed` in the same statement so two concurrent pollers can't both
    /// mint a token pair for the same device code.
    pub async fn consume(&self, device_code_hash: &str) -> Result<bool, OAuthError> {
        let result = sqlx::query(
            r#"
            UPDATE device_codes
            SET status = 'consumed'
            WHERE device_code_hash = ? AND status = 'authorized'
            "#,
        )
        .bind(device_code_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn touch_last_polled(&self, device_code_hash: &str) -> Result<(), OAuthError> {
        sqlx::query("UPDATE device_codes SET last_polled_at = CURRENT_TIMESTAMP WHERE device_code_hash = ?")
            .bind(device_code_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(())
    }

    pub async fn mark_expired(&self, id: Uuid) -> Result<(), OAuthError> {
        sqlx::query("UPDATE device_codes SET status = 'expired' WHERE id = ? AND status = 'pending'")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(())
    }

    /// Sweeps pending rows whose lifetime has elapsed. Meant to be driven by a
    /// periodic background task rather than checked on every poll, since
    /// expiry is also checked inline against `expires_at` at poll time.
    pub async fn expire_stale(&self) -> Result<u64, OAuthError> {
        let result = sqlx::query(
            "UPDATE device_codes SET status = 'expired' WHERE status = 'pending' AND expires_at < ?",
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(result.rows_affected())
    }

    pub async fn delete_older_than(&self, cutoff: chrono::DateTime<Utc>) -> Result<u64, OAuthError> {
        let result = sqlx::query("DELETE FROM device_codes WHERE created_at < ? AND status != 'pending'")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(result.rows_affected())
    }
}

pub fn is_terminal(status: DeviceCodeStatus) -> bool {
    matches!(
        status,
        DeviceCodeStatus::Denied | DeviceCodeStatus::Expired | DeviceCodeStatus::Consumed
    )
}
