//! Client Authenticator (C4): resolves which client is calling and by which
//! method (`client_secret_basic`, `client_secret_post`, `none`), verifies the
//! secret in constant time, and gates which endpoints a client may use.

use axum::http::HeaderMap;
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::OAuthError;
use crate::models::oauth_client::{OAuthClient, TokenEndpointAuthMethod};
use crate::repositories::OAuthClientRepository;
use crate::utils::secret::verify_client_secret;

/// The endpoints this authenticator can be asked to gate access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Token,
    Introspect,
    Revoke,
}

/// Credentials pulled from either the `Authorization: Basic` header or form
/// fields, in that order of preference (RFC 6749 §2.3.1).
fn extract_credentials(
    headers: &HeaderMap,
    form_client_id: Option<&str>,
    form_client_secret: Option<&str>,
) -> Result<(String, Option<String>), OAuthError> {
    if let Some(auth) = headers.get(axum::http::header::AUTHORIZATION) {
        let auth = auth
            .to_str()
            .map_err(|_| OAuthError::InvalidClient)?;
        if let Some(encoded) = auth.strip_prefix("Basic ") {
            let decoded = STANDARD
                .decode(encoded)
                .map_err(|_| OAuthError::InvalidClient)?;
            let decoded = String::from_utf8(decoded).map_err(|_| OAuthError::InvalidClient)?;
            let (client_id, secret) = decoded.split_once(':').ok_or(OAuthError::InvalidClient)?;
            return Ok((
                urlencoding::decode(client_id).map_err(|_| OAuthError::InvalidClient)?.into_owned(),
                Some(urlencoding::decode(secret).map_err(|_| OAuthError::InvalidClient)?.into_owned()),
            ));
        }
    }

    let client_id = form_client_id
        .map(String::from)
        .ok_or(OAuthError::InvalidClient)?;
    Ok((client_id, form_client_secret.map(String::from)))
}

#[derive(Clone)]
pub struct ClientAuthenticator {
    clients: OAuthClientRepository,
}

impl ClientAuthenticator {
    pub fn new(clients: OAuthClientRepository) -> Self {
        Self { clients }
    }

    /// Authenticates a client given whatever credentials the request carried,
    /// pulled from the `Authorization` header or form body.
    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
        form_client_id: Option<&str>,
        form_client_secret: Option<&str>,
    ) -> Result<OAuthClient, OAuthError> {
        let (client_id, client_secret) = extract_credentials(headers, form_client_id, form_client_secret)?;
        self.authenticate_with(&client_id, client_secret.as_deref()).await
    }

    /// Authenticates against an already-extracted `(client_id, client_secret)`
    /// pair, for callers (device polling, public clients) that never carry a
    /// secret at all.
    pub async fn authenticate_with(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> Result<OAuthClient, OAuthError> {
        let client = self
            .clients
            .find_active_by_client_id(client_id)
            .await?
            .ok_or(OAuthError::InvalidClient)?;

        match client.token_endpoint_auth_method {
            TokenEndpointAuthMethod::None => Ok(client),
            TokenEndpointAuthMethod::ClientSecretBasic | TokenEndpointAuthMethod::ClientSecretPost => {
                let provided = client_secret.ok_or(OAuthError::InvalidClient)?;
                let stored_hash = client.client_secret_hash.as_deref().ok_or(OAuthError::InvalidClient)?;
                if !verify_client_secret(provided, stored_hash) {
                    return Err(OAuthError::InvalidClient);
                }
                Ok(client)
            }
        }
    }

    /// `token` accepts any authenticated client; `introspect` demands
    /// confidentiality (a client that authenticates with `none` cannot call
    /// it); `revoke` accepts any authenticated client but callers must still
    /// confirm the token being revoked belongs to it.
    pub fn authorize_for_endpoint(&self, client: &OAuthClient, endpoint: Endpoint) -> Result<(), OAuthError> {
        match endpoint {
            Endpoint::Token | Endpoint::Revoke => Ok(()),
            Endpoint::Introspect => {
                if client.is_public() {
                    Err(OAuthError::UnauthorizedClient)
                } else {
                    Ok(())
                }
            }
        }
    }
}
