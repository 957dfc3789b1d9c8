//! Consent Ledger (C6): check / grant / revoke, layered over
//! `OAuthConsentRepository` with the policy from §4.6 — a `trusted_client` or
//! a client that doesn't `require_consent` never needs a ledger row at all.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::OAuthError;
use crate::models::oauth_client::OAuthClient;
use crate::repositories::OAuthConsentRepository;

#[derive(Clone)]
pub struct ConsentLedger {
    repo: OAuthConsentRepository,
}

impl ConsentLedger {
    pub fn new(repo: OAuthConsentRepository) -> Self {
        Self { repo }
    }

    /// True iff the client can proceed straight to code issuance without a
    /// consent screen: trusted, consent not required, or an existing grant
    /// already covers every requested scope.
    pub async fn check_consent(
        &self,
        client: &OAuthClient,
        user_id: Uuid,
        scopes: &[String],
    ) -> Result<bool, OAuthError> {
        if client.trusted_client || !client.require_consent {
            return Ok(true);
        }
        self.repo.has_consent(user_id, client.id, scopes).await
    }

    pub async fn grant(
        &self,
        user_id: Uuid,
        client_id: Uuid,
        scopes: &[String],
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), OAuthError> {
        self.repo.upsert(user_id, client_id, scopes, expires_at).await?;
        Ok(())
    }

    pub async fn revoke(&self, user_id: Uuid, client_id: Uuid) -> Result<(), OAuthError> {
        self.repo.delete(user_id, client_id).await
    }
}

pub fn parse_scopes(scope: &str) -> Vec<String> {
    scope.split_whitespace().map(String::from).collect()
}

pub fn format_scopes(scopes: &[String]) -> String {
    scopes.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_round_trip() {
        let scopes = vec!["openid".to_string(), "profile".to_string(), "email".to_string()];
        let formatted = format_scopes(&scopes);
        let parsed = parse_scopes(&formatted);
        assert_eq!(parsed, scopes);
    }
}
