use std::sync::Arc;

use axum::extract::State;
use axum::{Json, Router, routing::get};
use serde_json::{Value, json};

use gateway_runtime::CapabilityProfile;

use crate::GatewayApiState;

pub fn router() -> Router<Arc<GatewayApiState>> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<Arc<GatewayApiState>>) -> Json<Value> {
    let config = state.sandbox.config();
    let profile = match config.profile {
        CapabilityProfile::Restricted => "restricted",
        CapabilityProfile::Extended { .. } => "extended",
    };

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "capabilityProfile": profile,
        "executionTimeoutSecs": config.timeout.as_secs(),
        "services": state.catalog.len(),
    }))
}
