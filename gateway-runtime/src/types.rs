use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Spending cap applied when the caller does not declare one.
pub const DEFAULT_MAX_AMOUNT: u64 = 300_000;

/// Lifetime of a transaction authorization token.
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 60;

/// Hard wall-clock ceiling for one script execution.
pub const DEFAULT_EXECUTION_TIMEOUT_SECS: u64 = 180;

/// Secret name → secret value.
pub type SecretMap = BTreeMap<String, String>;

/// Wallet material supplied with a single execution request.
///
/// Never persisted; lives exactly as long as the request that carried it.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct WalletCredentials {
    /// Private key ciphertext (passphrase format, see `wallet_cipher`).
    pub encrypted_private_key: Option<String>,
    /// Public key the caller declares for the source account.
    pub public_key: Option<String>,
    /// Symmetric passphrase for `encrypted_private_key`.
    pub aes_key: Option<String>,
    /// Source account id.
    pub account_id: Option<String>,
    /// Tenant the execution runs on behalf of.
    pub tenant_id: Option<String>,
    /// Caller-declared spending cap.
    pub max_amount: Option<u64>,
}

impl WalletCredentials {
    /// Cap every issued token must respect.
    pub fn declared_cap(&self) -> u64 {
        self.max_amount.unwrap_or(DEFAULT_MAX_AMOUNT)
    }
}

impl std::fmt::Debug for WalletCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletCredentials")
            .field("encrypted_private_key", &self.encrypted_private_key.as_ref().map(|_| "<redacted>"))
            .field("public_key", &self.public_key)
            .field("aes_key", &self.aes_key.as_ref().map(|_| "<redacted>"))
            .field("account_id", &self.account_id)
            .field("tenant_id", &self.tenant_id)
            .field("max_amount", &self.max_amount)
            .finish()
    }
}

/// Console output captured from one execution. Each entry holds the
/// arguments of a single `console::log` / `console::error` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsoleOutput {
    pub logs: Vec<serde_json::Value>,
    pub errors: Vec<serde_json::Value>,
}
