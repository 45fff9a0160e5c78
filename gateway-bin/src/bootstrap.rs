//! One-time secret bootstrap run before the listener binds.
//!
//! Every `{{secrets.NAME}}` referenced under the bootstrap directory that the
//! store does not know yet is looked up as `GATEWAY_SECRET_<NAME>`.

use std::collections::BTreeSet;
use std::path::Path;

use gateway_runtime::secrets::extract_secret_names_from_dir;
use gateway_runtime::{GatewayError, SecretStore};

pub const SECRET_ENV_PREFIX: &str = "GATEWAY_SECRET_";

#[derive(Debug, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub referenced: usize,
    pub added: BTreeSet<String>,
    pub missing: BTreeSet<String>,
}

pub fn bootstrap_secrets(
    dir: &Path,
    store: &SecretStore,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<BootstrapReport, GatewayError> {
    let referenced = extract_secret_names_from_dir(dir)?;
    let mut secrets = store.try_load()?;
    let mut report = BootstrapReport {
        referenced: referenced.len(),
        ..Default::default()
    };

    for name in referenced {
        if secrets.contains_key(&name) {
            continue;
        }
        match lookup(&format!("{SECRET_ENV_PREFIX}{name}")) {
            Some(value) if !value.is_empty() => {
                secrets.insert(name.clone(), value);
                report.added.insert(name);
            }
            _ => {
                report.missing.insert(name);
            }
        }
    }

    if !report.added.is_empty() {
        store.save(&secrets)?;
        tracing::info!(
            added = report.added.len(),
            path = %store.path().display(),
            "Secret store updated from environment"
        );
    }
    if !report.missing.is_empty() {
        let names: Vec<&str> = report.missing.iter().map(String::as_str).collect();
        tracing::warn!(
            "Secrets referenced but not configured (set {SECRET_ENV_PREFIX}<NAME>): {}",
            names.join(", ")
        );
    }

    Ok(report)
}
