use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;
use sha2::{Digest, Sha256};

// ============================================================================
// OAuth Token Hashing Utilities
// ============================================================================
// Access/refresh tokens, authorization codes, and device codes are hashed
// with SHA256 (not a slow KDF) before storage, because:
// 1. Tokens are already cryptographically random (high entropy)
// 2. SHA256 is fast, so validating a token on every request stays cheap
// 3. No salt is needed since each token is unique and unguessable
// ============================================================================

/// Character set for OAuth token generation (URL-safe base64 characters)
const TOKEN_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Default length for generated OAuth tokens (256 bits of entropy)
pub const DEFAULT_TOKEN_LENGTH: usize = 43;

/// Generate a cryptographically secure random OAuth token.
pub fn generate_oauth_token() -> String {
    generate_oauth_token_with_length(DEFAULT_TOKEN_LENGTH)
}

/// Generate a cryptographically secure random OAuth token of a given length.
pub fn generate_oauth_token_with_length(length: usize) -> String {
    let mut rng = rand::thread_rng();

    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..TOKEN_CHARSET.len());
            TOKEN_CHARSET[idx] as char
        })
        .collect()
}

/// Hash an OAuth token using SHA256 for storage.
pub fn hash_oauth_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let hash = hasher.finalize();
    URL_SAFE_NO_PAD.encode(hash)
}

/// Verify an OAuth token against a stored hash.
pub fn verify_oauth_token(token: &str, hash: &str) -> bool {
    let computed_hash = hash_oauth_token(token);
    constant_time_compare(&computed_hash, hash)
}

// ============================================================================
// Client Secret Hashing Utilities
// ============================================================================
// Client secrets (RFC 6749 §2.3.1) are server-generated, high-entropy values,
// not user-chosen passwords, so the same SHA256-over-random-bytes approach used
// for access/refresh tokens applies here too. The plaintext carries a
// `secret_` prefix so client secrets are visually distinguishable from client
// IDs and access tokens in logs, support tickets, etc.
// ============================================================================

const CLIENT_SECRET_PREFIX: &str = "secret_";

/// Generate a new client secret in `secret_<random>` form.
pub fn generate_client_secret() -> String {
    format!("{}{}", CLIENT_SECRET_PREFIX, generate_oauth_token_with_length(48))
}

/// Hash a client secret for storage.
pub fn hash_client_secret(secret: &str) -> String {
    hash_oauth_token(secret)
}

/// Verify a client secret against its stored hash.
pub fn verify_client_secret(secret: &str, hash: &str) -> bool {
    verify_oauth_token(secret, hash)
}

/// Constant-time string comparison to prevent timing attacks.
pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_oauth_token_default_length() {
        let token = generate_oauth_token();
        assert_eq!(token.len(), DEFAULT_TOKEN_LENGTH);
    }

    #[test]
    fn test_generate_oauth_token_with_custom_length() {
        let length = 64;
        let token = generate_oauth_token_with_length(length);
        assert_eq!(token.len(), length);
    }

    #[test]
    fn test_generate_oauth_token_url_safe_chars() {
        let token = generate_oauth_token();
        let valid_chars: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

        for c in token.chars() {
            assert!(valid_chars.contains(c), "Token contains invalid character: {}", c);
        }
    }

    #[test]
    fn test_generate_oauth_token_uniqueness() {
        let token1 = generate_oauth_token();
        let token2 = generate_oauth_token();
        assert_ne!(token1, token2);
    }

    #[test]
    fn test_hash_oauth_token_not_equal_to_plain_text() {
        let token = generate_oauth_token();
        let hash = hash_oauth_token(&token);
        assert_ne!(token, hash);
    }

    #[test]
    fn test_hash_oauth_token_deterministic() {
        let token = "test_token_12345";
        let hash1 = hash_oauth_token(token);
        let hash2 = hash_oauth_token(token);
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_oauth_token_produces_base64url() {
        let token = generate_oauth_token();
        let hash = hash_oauth_token(&token);

        assert_eq!(hash.len(), 43);
        for c in hash.chars() {
            assert!(c.is_ascii_alphanumeric() || c == '-' || c == '_');
        }
    }

    #[test]
    fn test_verify_oauth_token_correct() {
        let token = generate_oauth_token();
        let hash = hash_oauth_token(&token);
        assert!(verify_oauth_token(&token, &hash));
    }

    #[test]
    fn test_verify_oauth_token_incorrect() {
        let token = generate_oauth_token();
        let wrong_token = generate_oauth_token();
        let hash = hash_oauth_token(&token);
        assert!(!verify_oauth_token(&wrong_token, &hash));
    }

    #[test]
    fn test_verify_oauth_token_tampered_hash() {
        let token = generate_oauth_token();
        let hash = hash_oauth_token(&token);

        let mut tampered_hash = hash.clone();
        if tampered_hash.ends_with('a') {
            tampered_hash.pop();
            tampered_hash.push('b');
        } else {
            tampered_hash.pop();
            tampered_hash.push('a');
        }

        assert!(!verify_oauth_token(&token, &tampered_hash));
    }

    #[test]
    fn test_client_secret_round_trip() {
        let secret = generate_client_secret();
        assert!(secret.starts_with(CLIENT_SECRET_PREFIX));
        let hash = hash_client_secret(&secret);
        assert!(verify_client_secret(&secret, &hash));
        assert!(!verify_client_secret("secret_wrong", &hash));
    }

    #[test]
    fn test_constant_time_compare_equal() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(constant_time_compare("", ""));
    }

    #[test]
    fn test_constant_time_compare_not_equal() {
        assert!(!constant_time_compare("hello", "world"));
        assert!(!constant_time_compare("hello", "hello!"));
        assert!(!constant_time_compare("hello", "hell"));
    }
}
