//! RSA signing key lifecycle (Key Manager, C1) and RS256 JWT issuance /
//! verification (JWT Signer/Verifier, C2).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dto::oauth::{JwkKey, Jwks};
use crate::error::OAuthError;
use crate::models::JwtKey;
use crate::repositories::JwtKeyRepository;

const ALGORITHM_NAME: &str = "RS256";
const RSA_KEY_SIZE_BITS: usize = 2048;

pub const DEFAULT_ROTATION_INTERVAL_SECS: i64 = 24 * 3600;
pub const DEFAULT_KEY_LIFETIME_SECS: i64 = 7 * 24 * 3600;
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 3600;
pub const DEFAULT_ID_TOKEN_TTL_SECS: i64 = 3600;

/// The signing material for one `kid`, cached in memory so every request
/// avoids a DB round trip to sign or verify.
#[derive(Clone)]
struct KeyPair {
    kid: String,
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    n: String,
    e: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

struct KeyManagerState {
    active: Option<KeyPair>,
    by_kid: HashMap<String, KeyPair>,
}

/// Owns the RSA signing key rotation lifecycle: generation, the in-memory
/// cache (RW-locked; many readers verify concurrently with the occasional
/// rotation writer), persistence, and JWKS publication.
#[derive(Clone)]
pub struct KeyManager {
    repo: JwtKeyRepository,
    state: Arc<RwLock<KeyManagerState>>,
    rotation_interval: Duration,
    key_lifetime_secs: i64,
}

impl KeyManager {
    /// Loads every unretired key from the durable store into the cache. If
    /// none exist yet (fresh deployment), generates and persists the first
    /// one.
    pub async fn new(
        repo: JwtKeyRepository,
        rotation_interval_secs: i64,
        key_lifetime_secs: i64,
    ) -> Result<Self, OAuthError> {
        let manager = Self {
            repo,
            state: Arc::new(RwLock::new(KeyManagerState {
                active: None,
                by_kid: HashMap::new(),
            })),
            rotation_interval: Duration::seconds(rotation_interval_secs),
            key_lifetime_secs,
        };
        manager.bootstrap().await?;
        Ok(manager)
    }

    async fn bootstrap(&self) -> Result<(), OAuthError> {
        let unretired = self.repo.list_unretired().await?;
        if unretired.is_empty() {
            self.generate_and_store(None).await?;
            return Ok(());
        }

        let mut state = self.state.write().await;
        for row in &unretired {
            let kp = Self::keypair_from_model(row, self.key_lifetime_secs)?;
            if row.is_active {
                state.active = Some(kp.clone());
            }
            state.by_kid.insert(kp.kid.clone(), kp);
        }
        Ok(())
    }

    fn keypair_from_model(key: &JwtKey, default_lifetime_secs: i64) -> Result<KeyPair, OAuthError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_pem.as_bytes())
            .map_err(|e| OAuthError::ServerError(format!("invalid signing key {}: {e}", key.kid)))?;
        let decoding_key = DecodingKey::from_rsa_pem(key.public_pem.as_bytes())
            .map_err(|e| OAuthError::ServerError(format!("invalid verification key {}: {e}", key.kid)))?;
        let public = RsaPublicKey::from_public_key_pem(&key.public_pem)
            .map_err(|e| OAuthError::ServerError(format!("invalid public pem {}: {e}", key.kid)))?;
        let n = URL_SAFE_NO_PAD.encode(public.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(public.e().to_bytes_be());

        Ok(KeyPair {
            kid: key.kid.clone(),
            encoding_key: Arc::new(encoding_key),
            decoding_key: Arc::new(decoding_key),
            n,
            e,
            created_at: key.created_at,
            expires_at: key
                .retire_at
                .unwrap_or_else(|| key.created_at + Duration::seconds(default_lifetime_secs)),
        })
    }

    fn generate_pem_pair() -> Result<(String, String, String), OAuthError> {
        let private = RsaPrivateKey::new(&mut OsRng, RSA_KEY_SIZE_BITS)
            .map_err(|e| OAuthError::ServerError(format!("key generation failed: {e}")))?;
        let public = private.to_public_key();

        let private_pem = private
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| OAuthError::ServerError(format!("failed to encode private key: {e}")))?
            .to_string();
        let public_pem = public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| OAuthError::ServerError(format!("failed to encode public key: {e}")))?;

        let kid = Uuid::new_v4().to_string();
        Ok((private_pem, public_pem, kid))
    }

    async fn generate_and_store(&self, retire_after: Option<DateTime<Utc>>) -> Result<KeyPair, OAuthError> {
        let (private_pem, public_pem, kid) = Self::generate_pem_pair()?;

        let stored = match retire_after {
            Some(retire_at) => {
                self.repo
                    .rotate(&kid, &private_pem, &public_pem, ALGORITHM_NAME, retire_at)
                    .await?
            }
            None => self.repo.insert(&kid, &private_pem, &public_pem, ALGORITHM_NAME).await?,
        };

        let kp = Self::keypair_from_model(&stored, self.key_lifetime_secs)?;

        let mut state = self.state.write().await;
        state.by_kid.insert(kp.kid.clone(), kp.clone());
        state.active = Some(kp.clone());
        Ok(kp)
    }

    async fn active_key(&self) -> Result<KeyPair, OAuthError> {
        self.state
            .read()
            .await
            .active
            .clone()
            .ok_or_else(|| OAuthError::ServerError("no active signing key".to_string()))
    }

    async fn key_by_kid(&self, kid: &str) -> Option<KeyPair> {
        let state = self.state.read().await;
        let kp = state.by_kid.get(kid)?;
        if kp.expires_at <= Utc::now() {
            return None;
        }
        Some(kp.clone())
    }

    pub async fn should_rotate(&self) -> bool {
        match self.state.read().await.active.as_ref() {
            Some(active) => Utc::now() - active.created_at >= self.rotation_interval,
            None => true,
        }
    }

    /// Generate a new key, mark the prior active key retiring (it stays
    /// selectable by `kid` for verification until its retirement window
    /// elapses), purge rows that finished retiring before now.
    pub async fn rotate(&self) -> Result<(), OAuthError> {
        let retire_at = Utc::now() + Duration::seconds(self.key_lifetime_secs);
        self.generate_and_store(Some(retire_at)).await?;
        self.repo.delete_retired_before(Utc::now()).await?;
        Ok(())
    }

    pub async fn jwks(&self) -> Jwks {
        let state = self.state.read().await;
        let now = Utc::now();
        let keys = state
            .by_kid
            .values()
            .filter(|kp| kp.expires_at > now)
            .map(|kp| JwkKey {
                kty: "RSA",
                use_: "sig",
                kid: kp.kid.clone(),
                alg: ALGORITHM_NAME,
                n: kp.n.clone(),
                e: kp.e.clone(),
            })
            .collect();
        Jwks { keys }
    }
}

// ============================================================================
// JWT claim shapes (C2)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
    pub jti: String,
    pub scope: String,
    pub client_id: String,
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
    pub jti: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    pub auth_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
}

/// End-user claims plugged into an ID token at issuance time, sourced from
/// the user directory (see `services::user_directory`).
#[derive(Debug, Clone, Default)]
pub struct IdentityClaims {
    pub preferred_username: Option<String>,
    pub email: Option<String>,
    pub email_verified: Option<bool>,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
}

#[derive(Clone)]
pub struct JwtSigner {
    keys: KeyManager,
    issuer: String,
    access_token_ttl: Duration,
    id_token_ttl: Duration,
}

impl JwtSigner {
    pub fn new(keys: KeyManager, issuer: String, access_token_ttl_secs: i64, id_token_ttl_secs: i64) -> Self {
        Self {
            keys,
            issuer,
            access_token_ttl: Duration::seconds(access_token_ttl_secs),
            id_token_ttl: Duration::seconds(id_token_ttl_secs),
        }
    }

    fn header_for(kid: &str) -> Header {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        header
    }

    /// Signs an access token and returns `(jwt, jti, expires_at)`.
    pub async fn sign_access_token(
        &self,
        sub: &str,
        client_id: &str,
        scopes: &[String],
    ) -> Result<(String, String, DateTime<Utc>), OAuthError> {
        let active = self.keys.active_key().await?;
        let now = Utc::now();
        let exp = now + self.access_token_ttl;
        let jti = Uuid::new_v4().to_string();

        let claims = AccessTokenClaims {
            iss: self.issuer.clone(),
            sub: sub.to_string(),
            aud: client_id.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti: jti.clone(),
            scope: scopes.join(" "),
            client_id: client_id.to_string(),
            token_type: "Bearer".to_string(),
        };

        let token = encode(&Self::header_for(&active.kid), &claims, &active.encoding_key)
            .map_err(|e| OAuthError::ServerError(format!("failed to sign access token: {e}")))?;
        Ok((token, jti, exp))
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn sign_id_token(
        &self,
        sub: &str,
        client_id: &str,
        nonce: Option<&str>,
        auth_time: DateTime<Utc>,
        identity: &IdentityClaims,
    ) -> Result<String, OAuthError> {
        let active = self.keys.active_key().await?;
        let now = Utc::now();
        let exp = now + self.id_token_ttl;

        let claims = IdTokenClaims {
            iss: self.issuer.clone(),
            sub: sub.to_string(),
            aud: client_id.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            nonce: nonce.map(String::from),
            auth_time: auth_time.timestamp(),
            preferred_username: identity.preferred_username.clone(),
            email: identity.email.clone(),
            email_verified: identity.email_verified,
            name: identity.name.clone(),
            given_name: identity.given_name.clone(),
            family_name: identity.family_name.clone(),
        };

        encode(&Self::header_for(&active.kid), &claims, &active.encoding_key)
            .map_err(|e| OAuthError::ServerError(format!("failed to sign id token: {e}")))
    }

    /// Verifies signature, expiry, not-before, and issuer. Does not check
    /// token-store revocation - callers must additionally confirm the token
    /// is still valid via the token repository (`IsValid`).
    pub async fn verify_access_token(&self, token: &str) -> Result<AccessTokenClaims, OAuthError> {
        let header = decode_header(token).map_err(|_| OAuthError::InvalidGrant("Malformed access token".to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| OAuthError::InvalidGrant("Access token missing key id".to_string()))?;
        let key = self
            .keys
            .key_by_kid(&kid)
            .await
            .ok_or_else(|| OAuthError::InvalidGrant("Unknown signing key".to_string()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_nbf = true;

        let data = decode::<AccessTokenClaims>(token, &key.decoding_key, &validation)
            .map_err(|_| OAuthError::InvalidGrant("Access token invalid or expired".to_string()))?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keypair_round_trips_through_jsonwebtoken() {
        let (private_pem, public_pem, _kid) = KeyManager::generate_pem_pair().unwrap();
        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap();
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes()).unwrap();

        #[derive(Serialize, Deserialize)]
        struct Claims {
            sub: String,
        }

        let token = encode(
            &Header::new(Algorithm::RS256),
            &Claims { sub: "user-1".to_string() },
            &encoding_key,
        )
        .unwrap();

        let mut validation = Validation::new(Algorithm::RS256);
        validation.required_spec_claims.clear();
        let decoded = decode::<Claims>(&token, &decoding_key, &validation).unwrap();
        assert_eq!(decoded.claims.sub, "user-1");
    }

    #[test]
    fn jwk_modulus_and_exponent_are_base64url_without_padding() {
        let (_private_pem, public_pem, kid) = KeyManager::generate_pem_pair().unwrap();
        let key = JwtKey {
            id: Uuid::new_v4(),
            kid: kid.clone(),
            private_pem: _private_pem,
            public_pem,
            algorithm: ALGORITHM_NAME.to_string(),
            is_active: true,
            created_at: Utc::now(),
            retire_at: None,
        };
        let kp = KeyManager::keypair_from_model(&key, DEFAULT_KEY_LIFETIME_SECS).unwrap();
        assert_eq!(kp.kid, kid);
        assert!(!kp.n.contains('='));
        assert!(!kp.e.contains('='));
    }
}
