pub mod credentials;
pub mod exchange;
pub mod flow;
pub mod middleware;
pub mod state;

pub use credentials::{CredentialCache, CredentialRecord, CredentialStatus};
pub use exchange::{HttpTokenExchange, TokenExchange, TokenResponse};
pub use flow::{AuthFlowService, IssuedCredential, RefreshedToken};
pub use middleware::{CallCredentials, CredentialBridge, credential_middleware};
pub use state::OneTimeStore;
