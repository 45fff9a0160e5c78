use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{Method, StatusCode};
use axum::{Json, Router, routing::get};
use serde_json::{Map, Value, json};

use gateway_runtime::types::ConsoleOutput;
use gateway_runtime::{MeteredServiceClient, SecretMap, WalletAuthorizer, mask_secrets, render_secrets};

use crate::GatewayApiState;
use crate::payload::ExecutionPayload;

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

pub fn router() -> Router<Arc<GatewayApiState>> {
    Router::new().route("/", get(execute_get).post(execute_post))
}

async fn execute_get(
    State(state): State<Arc<GatewayApiState>>,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult {
    let payload = ExecutionPayload::from_query(&query)
        .map_err(|e| failure(format!("Invalid request: {e}"), None))?;
    run(&state, Method::GET, query, payload).await
}

async fn execute_post(
    State(state): State<Arc<GatewayApiState>>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> ApiResult {
    let payload = ExecutionPayload::from_body(&body)
        .map_err(|e| failure(format!("Invalid request body: {e}"), None))?;
    run(&state, Method::POST, query, payload).await
}

/// `{method, queryParams, ...event}`; keys from the caller's event win.
fn build_event(method: &Method, query: HashMap<String, String>, extra: Option<Value>) -> Value {
    let mut event = Map::new();
    event.insert("method".into(), Value::String(method.to_string()));
    event.insert("queryParams".into(), json!(query));
    if let Some(Value::Object(extra)) = extra {
        event.extend(extra);
    }
    Value::Object(event)
}

fn failure(message: String, console: Option<ConsoleOutput>) -> (StatusCode, Json<Value>) {
    let body = match console {
        Some(console) => json!({
            "error": message,
            "consoleLogs": console.logs,
            "consoleErrors": console.errors,
        }),
        None => json!({ "error": message }),
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body))
}

fn sanitize(state: &GatewayApiState, body: Value, secrets: &SecretMap) -> Value {
    if state.mask_output {
        mask_secrets(&body, secrets)
    } else {
        body
    }
}

async fn run(
    state: &GatewayApiState,
    method: Method,
    query: HashMap<String, String>,
    payload: ExecutionPayload,
) -> ApiResult {
    let debug = payload.debug;
    let credentials = payload.credentials();

    let Some(code) = payload.user_code.filter(|c| !c.trim().is_empty()) else {
        return Err(failure("userCode is required".into(), None));
    };

    let mut secrets = state.secret_store.load();
    secrets.extend(payload.secrets);
    let code = render_secrets(&code, &secrets);

    let event = build_event(&method, query, payload.event);

    let authorizer = WalletAuthorizer::new(state.issuer.clone(), credentials);
    let services = MeteredServiceClient::new(
        state.http.clone(),
        state.catalog.clone(),
        Arc::new(authorizer),
    );
    let registry = state.sandbox.registry().with_services(services);

    let debug_flag = debug;
    tracing::info!(%method, debug = debug_flag, "Executing script");
    let outcome = state.sandbox.execute(code, event, registry).await;
    let console = outcome.console;

    match outcome.result {
        Ok(result) => {
            let body = if debug {
                json!({
                    "result": result,
                    "consoleLogs": console.logs,
                    "consoleErrors": console.errors,
                })
            } else {
                result
            };
            Ok(Json(sanitize(state, body, &secrets)))
        }
        Err(e) => {
            let (status, Json(body)) = failure(e.to_string(), debug.then_some(console));
            Err((status, Json(sanitize(state, body, &secrets))))
        }
    }
}
