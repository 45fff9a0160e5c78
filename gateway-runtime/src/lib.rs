pub mod authorization;
pub mod catalog;
pub mod error;
pub mod masking;
pub mod metered;
pub mod sandbox;
pub mod secrets;
pub mod types;
pub mod wallet_cipher;

pub use authorization::{TransactionIssuer, TransactionProvider, WalletAuthorizer};
pub use catalog::ServiceCatalog;
pub use error::GatewayError;
pub use masking::mask_secrets;
pub use metered::MeteredServiceClient;
pub use sandbox::{CapabilityProfile, CapabilityRegistry, ExecutionOutcome, Sandbox, SandboxConfig};
pub use secrets::{SecretStore, render_secrets};
pub use types::*;
