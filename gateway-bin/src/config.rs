use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use gateway_runtime::types::DEFAULT_EXECUTION_TIMEOUT_SECS;
use gateway_runtime::{CapabilityProfile, GatewayError, SandboxConfig, SecretStore};

pub const DEFAULT_BIND: &str = "127.0.0.1:38595";
pub const DEFAULT_FS_ROOT: &str = "/tmp";

/// Startup configuration, read once from the environment.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind: SocketAddr,
    pub secrets_path: PathBuf,
    pub execution_timeout: Duration,
    pub profile: CapabilityProfile,
    pub mask_output: bool,
    pub catalog_path: Option<PathBuf>,
    pub bootstrap_dir: Option<PathBuf>,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, GatewayError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, GatewayError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind = var("GATEWAY_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind: SocketAddr = bind
            .parse()
            .map_err(|e| GatewayError::Config(format!("GATEWAY_BIND '{bind}': {e}")))?;

        let secrets_path = var("GATEWAY_SECRETS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(SecretStore::default_path);

        let timeout_secs = match var("GATEWAY_EXECUTION_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                GatewayError::Config(format!("GATEWAY_EXECUTION_TIMEOUT_SECS '{raw}': {e}"))
            })?,
            None => DEFAULT_EXECUTION_TIMEOUT_SECS,
        };
        if timeout_secs == 0 {
            return Err(GatewayError::Config(
                "GATEWAY_EXECUTION_TIMEOUT_SECS must be positive".into(),
            ));
        }

        let fs_root = var("GATEWAY_FS_ROOT").unwrap_or_else(|| DEFAULT_FS_ROOT.to_string());
        let profile = CapabilityProfile::from_name(
            &var("GATEWAY_CAPABILITY_PROFILE").unwrap_or_default(),
            PathBuf::from(fs_root),
        )?;

        let mask_output = var("GATEWAY_MASK_OUTPUT")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        Ok(Self {
            bind,
            secrets_path,
            execution_timeout: Duration::from_secs(timeout_secs),
            profile,
            mask_output,
            catalog_path: var("GATEWAY_CATALOG_PATH").map(PathBuf::from),
            bootstrap_dir: var("GATEWAY_BOOTSTRAP_DIR").map(PathBuf::from),
        })
    }

    pub fn sandbox_config(&self) -> SandboxConfig {
        SandboxConfig {
            timeout: self.execution_timeout,
            profile: self.profile.clone(),
        }
    }
}
