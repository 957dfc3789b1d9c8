use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::oauth_client::{ApplicationType, TokenEndpointAuthMethod};
use crate::models::OAuthClient;

const SELECT_COLUMNS: &str = r#"
    id, client_id, client_secret_hash, name, application_type, organization_id,
    environment_id, app_id, redirect_uris, post_logout_redirect_uris, grant_types,
    response_types, allowed_scopes, token_endpoint_auth_method,
    require_pkce, require_consent, trusted_client, is_internal, is_active, metadata,
    created_at, updated_at
"#;

/// Registration inputs for a new client, grouped because the constructor
/// already takes more parameters than a positional call site reads well.
pub struct NewOAuthClient<'a> {
    pub client_id: &'a str,
    pub client_secret_hash: Option<&'a str>,
    pub name: &'a str,
    pub application_type: ApplicationType,
    pub organization_id: Option<Uuid>,
    pub environment_id: Uuid,
    pub app_id: Uuid,
    pub redirect_uris: &'a [String],
    pub post_logout_redirect_uris: &'a [String],
    pub grant_types: &'a [String],
    pub response_types: &'a [String],
    pub allowed_scopes: &'a [String],
    pub token_endpoint_auth_method: TokenEndpointAuthMethod,
    pub require_pkce: bool,
    pub require_consent: bool,
    pub trusted_client: bool,
    pub is_internal: bool,
    pub metadata: serde_json::Value,
}

#[derive(Clone)]
pub struct OAuthClientRepository {
    pool: MySqlPool,
}

impl OAuthClientRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new_client: NewOAuthClient<'_>) -> Result<OAuthClient, OAuthError> {
        let id = Uuid::new_v4();
        let redirect_uris_json = serde_json::to_value(new_client.redirect_uris)
            .map_err(|e| OAuthError::ServerError(format!("Failed to serialize redirect_uris: {}", e)))?;
        let post_logout_json = serde_json::to_value(new_client.post_logout_redirect_uris)
            .map_err(|e| OAuthError::ServerError(format!("Failed to serialize post_logout_redirect_uris: {}", e)))?;
        let grant_types_json = serde_json::to_value(new_client.grant_types)
            .map_err(|e| OAuthError::ServerError(format!("Failed to serialize grant_types: {}", e)))?;
        let response_types_json = serde_json::to_value(new_client.response_types)
            .map_err(|e| OAuthError::ServerError(format!("Failed to serialize response_types: {}", e)))?;
        let allowed_scopes_json = serde_json::to_value(new_client.allowed_scopes)
            .map_err(|e| OAuthError::ServerError(format!("Failed to serialize allowed_scopes: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO oauth_clients (
                id, client_id, client_secret_hash, name, application_type, organization_id,
                environment_id, app_id, redirect_uris, post_logout_redirect_uris, grant_types,
                response_types, allowed_scopes, token_endpoint_auth_method,
                require_pkce, require_consent, trusted_client, is_internal, metadata
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(new_client.client_id)
        .bind(new_client.client_secret_hash)
        .bind(new_client.name)
        .bind(new_client.application_type.as_str())
        .bind(new_client.organization_id.map(|o| o.to_string()))
        .bind(new_client.environment_id.to_string())
        .bind(new_client.app_id.to_string())
        .bind(&redirect_uris_json)
        .bind(&post_logout_json)
        .bind(&grant_types_json)
        .bind(&response_types_json)
        .bind(&allowed_scopes_json)
        .bind(new_client.token_endpoint_auth_method.as_str())
        .bind(new_client.require_pkce)
        .bind(new_client.require_consent)
        .bind(new_client.trusted_client)
        .bind(new_client.is_internal)
        .bind(&new_client.metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.code().map(|c| c == "23000").unwrap_or(false)
                    || db_err.message().contains("Duplicate entry")
                {
                    return OAuthError::InvalidRequest("client_id already exists".to_string());
                }
            }
            OAuthError::ServerError(format!("Database error: {}", e))
        })?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| OAuthError::ServerError("Failed to fetch created client".to_string()))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<OAuthClient>, OAuthError> {
        let client = sqlx::query_as::<_, OAuthClient>(&format!(
            "SELECT {} FROM oauth_clients WHERE id = ?",
            SELECT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(client)
    }

    pub async fn find_by_client_id(&self, client_id: &str) -> Result<Option<OAuthClient>, OAuthError> {
        let client = sqlx::query_as::<_, OAuthClient>(&format!(
            "SELECT {} FROM oauth_clients WHERE client_id = ?",
            SELECT_COLUMNS
        ))
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(client)
    }

    pub async fn find_active_by_client_id(&self, client_id: &str) -> Result<Option<OAuthClient>, OAuthError> {
        let client = sqlx::query_as::<_, OAuthClient>(&format!(
            "SELECT {} FROM oauth_clients WHERE client_id = ? AND is_active = true",
            SELECT_COLUMNS
        ))
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(client)
    }

    /// Resolves a client for a given app/environment/organization context: an
    /// org-scoped row (per-org override of the client's defaults) takes
    /// priority over the app-level row shared across all organizations.
    pub async fn find_by_client_id_with_context(
        &self,
        client_id: &str,
        app_id: Uuid,
        environment_id: Uuid,
        organization_id: Option<Uuid>,
    ) -> Result<Option<OAuthClient>, OAuthError> {
        if let Some(org_id) = organization_id {
            let scoped = sqlx::query_as::<_, OAuthClient>(&format!(
                "SELECT {} FROM oauth_clients WHERE client_id = ? AND app_id = ? AND environment_id = ? AND organization_id = ? AND is_active = true",
                SELECT_COLUMNS
            ))
            .bind(client_id)
            .bind(app_id.to_string())
            .bind(environment_id.to_string())
            .bind(org_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

            if scoped.is_some() {
                return Ok(scoped);
            }
        }

        let fallback = sqlx::query_as::<_, OAuthClient>(&format!(
            "SELECT {} FROM oauth_clients WHERE client_id = ? AND app_id = ? AND environment_id = ? AND organization_id IS NULL AND is_active = true",
            SELECT_COLUMNS
        ))
        .bind(client_id)
        .bind(app_id.to_string())
        .bind(environment_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(fallback)
    }

    pub async fn update(
        &self,
        id: Uuid,
        name: &str,
        redirect_uris: &[String],
    ) -> Result<OAuthClient, OAuthError> {
        let redirect_uris_json = serde_json::to_value(redirect_uris)
            .map_err(|e| OAuthError::ServerError(format!("Failed to serialize redirect_uris: {}", e)))?;

        let result = sqlx::query(
            r#"
            UPDATE oauth_clients
            SET name = ?, redirect_uris = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(name)
        .bind(&redirect_uris_json)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(OAuthError::InvalidClient);
        }

        self.find_by_id(id).await?.ok_or(OAuthError::InvalidClient)
    }

    pub async fn update_secret(&self, id: Uuid, client_secret_hash: &str) -> Result<(), OAuthError> {
        let result = sqlx::query(
            r#"
            UPDATE oauth_clients
            SET client_secret_hash = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(client_secret_hash)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(OAuthError::InvalidClient);
        }

        Ok(())
    }

    pub async fn deactivate(&self, id: Uuid) -> Result<(), OAuthError> {
        self.set_active(id, false).await
    }

    pub async fn activate(&self, id: Uuid) -> Result<(), OAuthError> {
        self.set_active(id, true).await
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> Result<(), OAuthError> {
        let result = sqlx::query(
            r#"
            UPDATE oauth_clients
            SET is_active = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(is_active)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(OAuthError::InvalidClient);
        }

        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), OAuthError> {
        let result = sqlx::query("DELETE FROM oauth_clients WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(OAuthError::InvalidClient);
        }

        Ok(())
    }

    pub async fn list_by_app(&self, app_id: Uuid) -> Result<Vec<OAuthClient>, OAuthError> {
        let clients = sqlx::query_as::<_, OAuthClient>(&format!(
            "SELECT {} FROM oauth_clients WHERE app_id = ? ORDER BY created_at DESC",
            SELECT_COLUMNS
        ))
        .bind(app_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(clients)
    }

    pub async fn list_by_org(&self, organization_id: Uuid) -> Result<Vec<OAuthClient>, OAuthError> {
        let clients = sqlx::query_as::<_, OAuthClient>(&format!(
            "SELECT {} FROM oauth_clients WHERE organization_id = ? ORDER BY created_at DESC",
            SELECT_COLUMNS
        ))
        .bind(organization_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(clients)
    }

    pub async fn count_by_app_and_env(&self, app_id: Uuid, environment_id: Uuid) -> Result<u64, OAuthError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM oauth_clients WHERE app_id = ? AND environment_id = ?",
        )
        .bind(app_id.to_string())
        .bind(environment_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(count as u64)
    }

    pub async fn list_all(&self) -> Result<Vec<OAuthClient>, OAuthError> {
        let clients = sqlx::query_as::<_, OAuthClient>(&format!(
            "SELECT {} FROM oauth_clients ORDER BY created_at DESC",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(clients)
    }

    pub async fn count_all(&self) -> Result<u64, OAuthError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM oauth_clients")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| OAuthError::ServerError(format!("Database error: {}", e)))?;

        Ok(count as u64)
    }
}
