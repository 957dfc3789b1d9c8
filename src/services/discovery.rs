//! OpenID Provider Metadata (C12): builds the `.well-known/openid-configuration`
//! document from `Config`, so every advertised endpoint is derived from the
//! one `issuer`/`base_path` pair rather than hard-coded in two places.

use crate::config::Config;
use crate::dto::oauth::OpenIdConfiguration;
use crate::models::oauth_client::SUPPORTED_SCOPES;

pub fn discovery_document(config: &Config) -> OpenIdConfiguration {
    let base = format!("{}{}", config.issuer, config.base_path);

    let mut grant_types_supported = vec![
        "authorization_code".to_string(),
        "refresh_token".to_string(),
        "client_credentials".to_string(),
    ];
    let device_authorization_endpoint = if config.device_flow.enabled {
        grant_types_supported.push("urn:ietf:params:oauth:grant-type:device_code".to_string());
        Some(format!("{base}/device_authorization"))
    } else {
        None
    };

    OpenIdConfiguration {
        issuer: config.issuer.clone(),
        authorization_endpoint: format!("{base}/authorize"),
        token_endpoint: format!("{base}/token"),
        userinfo_endpoint: format!("{base}/userinfo"),
        revocation_endpoint: format!("{base}/revoke"),
        introspection_endpoint: format!("{base}/introspect"),
        jwks_uri: format!("{base}/jwks"),
        registration_endpoint: format!("{base}/register"),
        device_authorization_endpoint,
        response_types_supported: vec!["code".to_string()],
        grant_types_supported,
        subject_types_supported: vec!["public".to_string()],
        id_token_signing_alg_values_supported: vec!["RS256".to_string()],
        scopes_supported: SUPPORTED_SCOPES.iter().map(|s| s.to_string()).collect(),
        token_endpoint_auth_methods_supported: vec![
            "client_secret_basic".to_string(),
            "client_secret_post".to_string(),
            "none".to_string(),
        ],
        code_challenge_methods_supported: vec!["S256".to_string(), "plain".to_string()],
        claims_supported: vec![
            "sub".to_string(),
            "name".to_string(),
            "preferred_username".to_string(),
            "given_name".to_string(),
            "family_name".to_string(),
            "email".to_string(),
            "email_verified".to_string(),
        ],
    }
}
