pub mod oauth_auth;

pub use oauth_auth::{bearer_auth_middleware, AuthenticatedToken};
