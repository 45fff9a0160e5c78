//! Local secret store and `{{secrets.NAME}}` templating.
//!
//! The store is a single JSON object on disk (name → value). It is read on
//! every execution and only written by the startup bootstrap.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::GatewayError;
use crate::types::SecretMap;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*secrets\.([A-Za-z0-9_]+)\s*\}\}").expect("placeholder pattern is valid")
});

/// Directories never descended into when scanning for placeholders.
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules", "target"];

#[derive(Debug, Clone)]
pub struct SecretStore {
    path: PathBuf,
}

impl SecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.script-gateway/secrets.json`, or a relative path when no home
    /// directory can be resolved.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".script-gateway")
            .join("secrets.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the mapping. A missing file is an empty mapping.
    pub fn try_load(&self) -> Result<SecretMap, GatewayError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SecretMap::new()),
            Err(e) => {
                return Err(GatewayError::Persistence(format!(
                    "read {}: {e}",
                    self.path.display()
                )));
            }
        };

        if raw.trim().is_empty() {
            return Ok(SecretMap::new());
        }

        serde_json::from_str(&raw).map_err(|e| {
            GatewayError::Persistence(format!("parse {}: {e}", self.path.display()))
        })
    }

    /// Like [`try_load`](Self::try_load) but an unreadable store counts as
    /// "no secrets yet".
    pub fn load(&self) -> SecretMap {
        match self.try_load() {
            Ok(secrets) => secrets,
            Err(e) => {
                tracing::warn!("Secret store unavailable, continuing without secrets: {e}");
                SecretMap::new()
            }
        }
    }

    pub fn save(&self, secrets: &SecretMap) -> Result<(), GatewayError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                GatewayError::Persistence(format!("create {}: {e}", parent.display()))
            })?;
        }

        let body = serde_json::to_string_pretty(secrets)?;
        std::fs::write(&self.path, body).map_err(|e| {
            GatewayError::Persistence(format!("write {}: {e}", self.path.display()))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = std::fs::set_permissions(&self.path, perms) {
                tracing::warn!("Could not restrict permissions on {}: {e}", self.path.display());
            }
        }

        tracing::debug!(count = secrets.len(), path = %self.path.display(), "secret store saved");
        Ok(())
    }
}

/// Replace every `{{ secrets.NAME }}` whose NAME is known. Unknown names are
/// left exactly as written.
pub fn render_secrets(code: &str, secrets: &SecretMap) -> String {
    PLACEHOLDER
        .replace_all(code, |caps: &Captures| match secrets.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Distinct secret names referenced in `text`.
pub fn extract_secret_names(text: &str) -> BTreeSet<String> {
    PLACEHOLDER
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Distinct secret names referenced by any UTF-8 file under `root`.
pub fn extract_secret_names_from_dir(root: &Path) -> Result<BTreeSet<String>, GatewayError> {
    let mut names = BTreeSet::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| GatewayError::Persistence(format!("read {}: {e}", dir.display())))?;

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };

            if file_type.is_dir() {
                let skipped = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| SKIPPED_DIRS.contains(&n));
                if !skipped {
                    pending.push(path);
                }
            } else if file_type.is_file() {
                match std::fs::read_to_string(&path) {
                    Ok(text) => names.extend(extract_secret_names(&text)),
                    Err(e) => tracing::debug!("Skipping {}: {e}", path.display()),
                }
            }
        }
    }

    Ok(names)
}
