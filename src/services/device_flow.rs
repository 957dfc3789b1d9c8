//! Device Flow Service (C11): RFC 8628 device/user code lifecycle, polling,
//! and the compare-and-swap state machine backing it
//! (`pending → {authorized, denied, expired}`, `authorized → consumed`).

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::dto::oauth::DeviceAuthorizationResponse;
use crate::error::OAuthError;
use crate::models::device_code::{DeviceCode, DeviceCodeStatus};
use crate::repositories::DeviceCodeRepository;
use crate::utils::secret::{generate_oauth_token, hash_oauth_token};

/// Excludes visually-ambiguous characters (0/O, 1/I/L) from the user code
/// alphabet, since a human has to type it back on another device.
const USER_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

fn generate_user_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| USER_CODE_ALPHABET[rng.gen_range(0..USER_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Strips separators/whitespace and upper-cases, so "wdjb-mjht" and "WDJB MJHT"
/// both resolve to the stored normalized form.
pub fn normalize_user_code(input: &str) -> String {
    input.chars().filter(|c| c.is_ascii_alphanumeric()).map(|c| c.to_ascii_uppercase()).collect()
}

/// Formats a normalized user code for display, hyphenating every 4 characters.
pub fn format_user_code(normalized: &str) -> String {
    normalized
        .as_bytes()
        .chunks(4)
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or(""))
        .collect::<Vec<_>>()
        .join("-")
}

#[derive(Clone)]
pub struct DeviceFlowService {
    repo: DeviceCodeRepository,
    code_expiry_secs: i64,
    polling_interval_secs: i64,
    user_code_length: usize,
    verification_uri: String,
}

impl DeviceFlowService {
    pub fn new(
        repo: DeviceCodeRepository,
        code_expiry_secs: i64,
        polling_interval_secs: i64,
        user_code_length: usize,
        verification_uri: String,
    ) -> Self {
        Self {
            repo,
            code_expiry_secs,
            polling_interval_secs,
            user_code_length: user_code_length.clamp(4, 20),
            verification_uri,
        }
    }

    pub async fn initiate(
        &self,
        client_id: Uuid,
        scopes: &[String],
    ) -> Result<(DeviceAuthorizationResponse, String), OAuthError> {
        let device_code = generate_oauth_token();
        let device_code_hash = hash_oauth_token(&device_code);
        let user_code = generate_user_code(self.user_code_length);
        let expires_at = Utc::now() + Duration::seconds(self.code_expiry_secs);

        self.repo
            .create(&device_code_hash, &user_code, client_id, scopes, self.polling_interval_secs, expires_at)
            .await?;

        let formatted = format_user_code(&user_code);
        let verification_uri_complete =
            format!("{}?user_code={}", self.verification_uri, urlencoding::encode(&user_code));

        Ok((
            DeviceAuthorizationResponse {
                device_code: device_code.clone(),
                user_code: formatted,
                verification_uri: self.verification_uri.clone(),
                verification_uri_complete,
                expires_in: self.code_expiry_secs,
                interval: self.polling_interval_secs,
            },
            device_code,
        ))
    }

    /// Resolves a token endpoint poll to either the authorized row (ready for
    /// token issuance) or the appropriate OAuth error per §4.11/§4.7.
    pub async fn poll(&self, device_code_plain: &str) -> Result<DeviceCode, OAuthError> {
        let hash = hash_oauth_token(device_code_plain);
        let device = self
            .repo
            .find_by_device_code_hash(&hash)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant("Unknown device_code".to_string()))?;

        if device.status == DeviceCodeStatus::Pending && device.is_expired() {
            self.repo.mark_expired(device.id).await?;
            return Err(OAuthError::ExpiredToken);
        }

        match device.status {
            DeviceCodeStatus::Pending => {
                if self.polling_too_fast(&device) {
                    return Err(OAuthError::SlowDown);
                }
                self.repo.touch_last_polled(&hash).await?;
                Err(OAuthError::AuthorizationPending)
            }
            DeviceCodeStatus::Denied => Err(OAuthError::AccessDenied),
            DeviceCodeStatus::Expired => Err(OAuthError::ExpiredToken),
            DeviceCodeStatus::Consumed => Err(OAuthError::InvalidGrant("device_code already used".to_string())),
            DeviceCodeStatus::Authorized => Ok(device),
        }
    }

    fn polling_too_fast(&self, device: &DeviceCode) -> bool {
        match device.last_polled_at {
            Some(last) => Utc::now() < last + Duration::seconds(device.interval_secs),
            None => false,
        }
    }

    pub async fn find_for_verification(&self, user_code_raw: &str) -> Result<Option<DeviceCode>, OAuthError> {
        self.repo.find_by_user_code(&normalize_user_code(user_code_raw)).await
    }

    pub async fn authorize(
        &self,
        user_code_raw: &str,
        user_id: Uuid,
        session_id: Option<Uuid>,
    ) -> Result<bool, OAuthError> {
        self.repo.authorize(&normalize_user_code(user_code_raw), user_id, session_id).await
    }

    pub async fn deny(&self, user_code_raw: &str) -> Result<bool, OAuthError> {
        self.repo.deny(&normalize_user_code(user_code_raw)).await
    }

    /// Claims an authorized device code for token issuance. Only ever called
    /// after `poll` has already confirmed `Authorized`, so failure here means
    /// a concurrent poller won the race - the caller treats that the same as
    /// "already consumed".
    pub async fn consume(&self, device_code_plain: &str) -> Result<bool, OAuthError> {
        let hash = hash_oauth_token(device_code_plain);
        self.repo.consume(&hash).await
    }

    pub async fn cleanup_expired(&self) -> Result<u64, OAuthError> {
        self.repo.expire_stale().await
    }

    pub async fn cleanup_old_terminal(&self, older_than: Duration) -> Result<u64, OAuthError> {
        let cutoff: DateTime<Utc> = Utc::now() - older_than;
        self.repo.delete_older_than(cutoff).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_then_format_is_not_identity_but_format_then_normalize_is() {
        let normalized = "WDJBMJHT";
        let formatted = format_user_code(normalized);
        assert_eq!(formatted, "WDJB-MJHT");
        assert_eq!(normalize_user_code(&formatted), normalized);
    }

    #[test]
    fn normalize_accepts_lowercase_and_separators() {
        assert_eq!(normalize_user_code("wdjb mjht"), "WDJBMJHT");
        assert_eq!(normalize_user_code("wdjb-mjht"), "WDJBMJHT");
    }
}
