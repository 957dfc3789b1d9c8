use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::JwtKey;

const SELECT_COLUMNS: &str = "id, kid, private_pem, public_pem, algorithm, is_active, created_at, retire_at";

/// Durable backend for the signing key rotation history. `KeyManager` keeps
/// the hot cache in memory; this repository is what makes the cache survive a
/// restart and what the JWKS endpoint's "all unretired keys" query hits.
#[derive(Clone)]
pub struct JwtKeyRepository {
    pool: MySqlPool,
}

impl JwtKeyRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        kid: &str,
        private_pem: &str,
        public_pem: &str,
        algorithm: &str,
    ) -> Result<JwtKey, OAuthError> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO jwt_keys (id, kid, private_pem, public_pem, algorithm, is_active)
            VALUES (?, ?, ?, ?, ?, true)
            "#,
        )
        .bind(id.to_string())
        .bind(kid)
        .bind(private_pem)
        .bind(public_pem)
        .bind(algorithm)
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        self.find_by_kid(kid)
            .await?
            .ok_or_else(|| OAuthError::ServerError("Failed to fetch inserted key".to_string()))
    }

    pub async fn find_by_kid(&self, kid: &str) -> Result<Option<JwtKey>, OAuthError> {
        let row = sqlx::query_as::<_, JwtKey>(&format!(
            "SELECT {} FROM jwt_keys WHERE kid = ?",
            SELECT_COLUMNS
        ))
        .bind(kid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(row)
    }

    pub async fn find_active(&self) -> Result<Option<JwtKey>, OAuthError> {
        let row = sqlx::query_as::<_, JwtKey>(&format!(
            "SELECT {} FROM jwt_keys WHERE is_active = true ORDER BY created_at DESC LIMIT 1",
            SELECT_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(row)
    }

    /// Keys still usable for signature verification: the active key plus any
    /// retiring key whose `retire_at` hasn't passed yet, so tokens minted
    /// right before a rotation still verify until they'd have expired anyway.
    pub async fn list_unretired(&self) -> Result<Vec<JwtKey>, OAuthError> {
        let rows = sqlx::query_as::<_, JwtKey>(&format!(
            "SELECT {} FROM jwt_keys WHERE is_active = true OR retire_at > ? ORDER BY created_at DESC",
            SELECT_COLUMNS
        ))
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(rows)
    }

    /// Rotation is a two-step write: the previous active key is marked
    /// retiring with a grace-period deadline, then the new key is inserted as
    /// active. Both happen in one transaction so a crash mid-rotation can't
    /// leave the signer with zero active keys.
    pub async fn rotate(
        &self,
        new_kid: &str,
        new_private_pem: &str,
        new_public_pem: &str,
        algorithm: &str,
        retire_after: DateTime<Utc>,
    ) -> Result<JwtKey, OAuthError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        sqlx::query("UPDATE jwt_keys SET is_active = false, retire_at = ? WHERE is_active = true")
            .bind(retire_after)
            .execute(&mut *tx)
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO jwt_keys (id, kid, private_pem, public_pem, algorithm, is_active)
            VALUES (?, ?, ?, ?, ?, true)
            "#,
        )
        .bind(id.to_string())
        .bind(new_kid)
        .bind(new_private_pem)
        .bind(new_public_pem)
        .bind(algorithm)
        .execute(&mut *tx)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        self.find_by_kid(new_kid)
            .await?
            .ok_or_else(|| OAuthError::ServerError("Failed to fetch rotated key".to_string()))
    }

    pub async fn delete_retired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, OAuthError> {
        let result = sqlx::query("DELETE FROM jwt_keys WHERE is_active = false AND retire_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(result.rows_affected())
    }
}
