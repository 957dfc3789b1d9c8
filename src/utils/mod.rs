pub mod jwt;
pub mod pkce;
pub mod secret;
