pub mod authorization_code;
pub mod device_code;
pub mod jwt_key;
pub mod oauth_audit_log;
pub mod oauth_client;
pub mod oauth_consent;
pub mod oauth_scope;
pub mod oauth_token;

pub use authorization_code::*;
pub use device_code::*;
pub use jwt_key::*;
pub use oauth_audit_log::*;
pub use oauth_client::*;
pub use oauth_consent::*;
pub use oauth_scope::*;
pub use oauth_token::*;
