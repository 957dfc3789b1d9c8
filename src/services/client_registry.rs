//! Client Registry (C3): registration validation and orchestration on top of
//! `OAuthClientRepository`. The repository already owns CRUD/lookup; this
//! module owns the invariants from the data model (redirect URI scheme
//! rules, `none` auth forcing PKCE, secret generation) that must hold before
//! a row is ever written.

use uuid::Uuid;

use crate::dto::oauth::{ClientRegistrationRequest, ClientRegistrationResponse};
use crate::error::OAuthError;
use crate::models::oauth_client::{ApplicationType, OAuthClient, TokenEndpointAuthMethod};
use crate::repositories::{NewOAuthClient, OAuthClientRepository, OAuthTokenRepository};
use crate::utils::secret::{generate_client_secret, generate_oauth_token, hash_client_secret};

/// Registers a client, returning the stored row plus the plaintext secret
/// (only ever available at this moment; the row keeps just the hash).
pub async fn register_client(
    repo: &OAuthClientRepository,
    req: &ClientRegistrationRequest,
    app_id: Uuid,
    environment_id: Uuid,
    organization_id: Option<Uuid>,
) -> Result<(OAuthClient, Option<String>), OAuthError> {
    let application_type = ApplicationType::parse(&req.application_type)
        .ok_or_else(|| OAuthError::InvalidRequest(format!("Unknown application_type '{}'", req.application_type)))?;

    validate_redirect_uris(application_type, &req.redirect_uris)?;

    let requested_auth_method = req
        .token_endpoint_auth_method
        .as_deref()
        .map(|m| {
            TokenEndpointAuthMethod::parse(m)
                .ok_or_else(|| OAuthError::InvalidRequest(format!("Unknown token_endpoint_auth_method '{}'", m)))
        })
        .transpose()?;

    let auth_method = requested_auth_method.unwrap_or(default_auth_method(application_type));
    let require_pkce = auth_method == TokenEndpointAuthMethod::None
        || matches!(application_type, ApplicationType::Native | ApplicationType::Spa);

    if auth_method == TokenEndpointAuthMethod::None
        && !matches!(application_type, ApplicationType::Native | ApplicationType::Spa)
    {
        return Err(OAuthError::InvalidRequest(
            "token_endpoint_auth_method=none requires application_type native or spa".to_string(),
        ));
    }

    let client_id = format!("client_{}", generate_oauth_token());
    let plaintext_secret = if auth_method == TokenEndpointAuthMethod::None {
        None
    } else {
        Some(generate_client_secret())
    };
    let secret_hash = plaintext_secret.as_deref().map(hash_client_secret);

    let grant_types = if req.grant_types.is_empty() {
        default_grant_types(application_type)
    } else {
        req.grant_types.clone()
    };
    let response_types = if req.response_types.is_empty() {
        vec!["code".to_string()]
    } else {
        req.response_types.clone()
    };

    let mut metadata = serde_json::Map::new();
    if let Some(logo) = &req.logo_uri {
        metadata.insert("logo_uri".to_string(), serde_json::Value::String(logo.clone()));
    }
    if let Some(policy) = &req.policy_uri {
        metadata.insert("policy_uri".to_string(), serde_json::Value::String(policy.clone()));
    }
    if let Some(tos) = &req.tos_uri {
        metadata.insert("tos_uri".to_string(), serde_json::Value::String(tos.clone()));
    }
    if !req.contacts.is_empty() {
        metadata.insert(
            "contacts".to_string(),
            serde_json::Value::Array(req.contacts.iter().cloned().map(serde_json::Value::String).collect()),
        );
    }
    for (k, v) in &req.metadata {
        metadata.insert(k.clone(), serde_json::Value::String(v.clone()));
    }

    let client = repo
        .create(NewOAuthClient {
            client_id: &client_id,
            client_secret_hash: secret_hash.as_deref(),
            name: &req.name,
            application_type,
            organization_id,
            environment_id,
            app_id,
            redirect_uris: &req.redirect_uris,
            post_logout_redirect_uris: &req.post_logout_redirect_uris,
            grant_types: &grant_types,
            response_types: &response_types,
            allowed_scopes: &req.allowed_scopes,
            token_endpoint_auth_method: auth_method,
            require_pkce,
            require_consent: req.require_consent,
            trusted_client: req.trusted_client,
            is_internal: false,
            metadata: serde_json::Value::Object(metadata),
        })
        .await?;

    Ok((client, plaintext_secret))
}

pub fn registration_response(client: &OAuthClient, plaintext_secret: Option<String>) -> ClientRegistrationResponse {
    ClientRegistrationResponse {
        client_id: client.client_id.clone(),
        client_secret: plaintext_secret,
        name: client.name.clone(),
        redirect_uris: client.redirect_uris.clone(),
        token_endpoint_auth_method: client.token_endpoint_auth_method.as_str().to_string(),
        require_pkce: client.require_pkce,
    }
}

fn default_auth_method(application_type: ApplicationType) -> TokenEndpointAuthMethod {
    match application_type {
        ApplicationType::Native | ApplicationType::Spa => TokenEndpointAuthMethod::None,
        ApplicationType::Web | ApplicationType::Service => TokenEndpointAuthMethod::ClientSecretBasic,
    }
}

fn default_grant_types(application_type: ApplicationType) -> Vec<String> {
    match application_type {
        ApplicationType::Service => vec!["client_credentials".to_string()],
        _ => vec!["authorization_code".to_string(), "refresh_token".to_string()],
    }
}

/// `web`/`spa` ⇒ HTTPS (localhost exception); `native` may use a custom
/// scheme or plain HTTP localhost. Every URI must be absolute, fragment-free,
/// and non-empty overall.
fn validate_redirect_uris(application_type: ApplicationType, redirect_uris: &[String]) -> Result<(), OAuthError> {
    if redirect_uris.is_empty() {
        return Err(OAuthError::InvalidRequest("redirect_uris must not be empty".to_string()));
    }

    for uri in redirect_uris {
        if uri.contains('#') {
            return Err(OAuthError::InvalidRequest(format!("redirect_uri '{}' must not contain a fragment", uri)));
        }

        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| OAuthError::InvalidRequest(format!("redirect_uri '{}' is not an absolute URL", uri)))?;
        let host = rest.split(['/', ':', '?']).next().unwrap_or("");
        let is_loopback = matches!(host, "localhost" | "127.0.0.1" | "::1");

        match application_type {
            ApplicationType::Web | ApplicationType::Spa => {
                if scheme != "https" && !is_loopback {
                    return Err(OAuthError::InvalidRequest(format!(
                        "redirect_uri '{}' must use https for application_type={}",
                        uri,
                        application_type.as_str()
                    )));
                }
            }
            ApplicationType::Native => {
                if scheme == "http" && !is_loopback {
                    return Err(OAuthError::InvalidRequest(format!(
                        "redirect_uri '{}' must use a custom scheme or loopback http for application_type=native",
                        uri
                    )));
                }
            }
            ApplicationType::Service => {}
        }
    }

    Ok(())
}

/// Deleting a client must cascade-revoke its tokens first (best-effort:
/// logged, never blocks the delete).
pub async fn delete_client(
    clients: &OAuthClientRepository,
    tokens: &OAuthTokenRepository,
    id: Uuid,
) -> Result<(), OAuthError> {
    let client = clients
        .find_by_id(id)
        .await?
        .ok_or_else(|| OAuthError::InvalidRequest("Client not found".to_string()))?;

    if let Err(e) = tokens.revoke_all_for_client(client.id).await {
        tracing::warn!(error = %e, client_id = %client.client_id, "failed to revoke tokens during client deletion");
    }

    clients.delete(id).await
}
