pub mod authorization_code;
pub mod device_code;
pub mod jwt_key;
pub mod oauth_audit_log;
pub mod oauth_client;
pub mod oauth_consent;
pub mod oauth_scope;
pub mod oauth_token;

pub use authorization_code::AuthorizationCodeRepository;
pub use device_code::DeviceCodeRepository;
pub use jwt_key::JwtKeyRepository;
pub use oauth_audit_log::OAuthAuditLogRepository;
pub use oauth_client::{NewOAuthClient, OAuthClientRepository};
pub use oauth_consent::OAuthConsentRepository;
pub use oauth_scope::OAuthScopeRepository;
pub use oauth_token::{NewOAuthToken, OAuthTokenRepository};
