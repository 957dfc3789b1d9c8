pub mod authorization;
pub mod client_auth;
pub mod client_registry;
pub mod consent;
pub mod device_flow;
pub mod discovery;
pub mod introspection;
pub mod revocation;
pub mod rotation;
pub mod session;
pub mod token_endpoint;
pub mod user_directory;
pub mod userinfo;

pub use client_auth::ClientAuthenticator;
pub use consent::ConsentLedger;
pub use device_flow::DeviceFlowService;
pub use rotation::RotationScheduler;
pub use session::SessionDirectory;
pub use user_directory::UserDirectory;
