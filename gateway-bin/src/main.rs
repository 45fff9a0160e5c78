mod bootstrap;
mod config;

use std::sync::Arc;

use gateway_http_api::{GatewayApiState, build_router};
use gateway_runtime::{GatewayError, Sandbox, SecretStore, ServiceCatalog, TransactionIssuer};

use crate::config::GatewayConfig;

fn setup_log() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};
    if tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .is_err()
    {}
}

#[tokio::main]
async fn main() -> Result<(), GatewayError> {
    let _ = dotenvy::dotenv();
    setup_log();

    // ── 1. Configuration ─────────────────────────────────────────────────────
    let config = GatewayConfig::from_env()?;

    let catalog = match &config.catalog_path {
        Some(path) => {
            tracing::info!("Loading service catalog from {}", path.display());
            ServiceCatalog::from_json_file(path)?
        }
        None => ServiceCatalog::builtin(),
    };

    // ── 2. Secret bootstrap ──────────────────────────────────────────────────
    let secret_store = SecretStore::new(config.secrets_path.clone());
    if let Some(dir) = &config.bootstrap_dir {
        let report = bootstrap::bootstrap_secrets(dir, &secret_store, |key| {
            std::env::var(key).ok()
        })?;
        tracing::info!(
            "Secret bootstrap scanned {}: {} referenced, {} added, {} missing",
            dir.display(),
            report.referenced,
            report.added.len(),
            report.missing.len()
        );
    }

    // ── 3. HTTP API ──────────────────────────────────────────────────────────
    let http = reqwest::Client::new();
    let state = Arc::new(GatewayApiState {
        sandbox: Sandbox::new(config.sandbox_config(), http.clone()),
        secret_store,
        catalog: Arc::new(catalog),
        issuer: TransactionIssuer::new(),
        http,
        mask_output: config.mask_output,
    });

    tracing::info!(
        profile = ?config.profile,
        timeout_secs = config.execution_timeout.as_secs(),
        mask_output = config.mask_output,
        services = state.catalog.len(),
        "Script gateway configured"
    );

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| GatewayError::Config(format!("bind {}: {e}", config.bind)))?;
    tracing::info!("Script gateway listening on {}", config.bind);

    axum::serve(listener, build_router(state))
        .await
        .map_err(|e| GatewayError::Http(format!("server stopped: {e}")))?;

    Ok(())
}
