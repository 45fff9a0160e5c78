//! Integration tests for the gateway HTTP API.
//!
//! Drives the real axum router with `oneshot`, an on-disk secret store in a
//! temp dir, and wiremock standing in for the metered services.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use http_body_util::BodyExt;
use hyper::Request;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gateway_http_api::{GatewayApiState, build_router};
use gateway_runtime::catalog::{self, PricingModel, ServiceDescriptor};
use gateway_runtime::metered::TRANSACTION_HEADER;
use gateway_runtime::{
    Sandbox, SandboxConfig, SecretMap, SecretStore, ServiceCatalog, TransactionIssuer,
};

struct TestApp {
    state: Arc<GatewayApiState>,
    _dir: TempDir,
}

fn test_app(secrets: &[(&str, &str)], catalog: ServiceCatalog, mask_output: bool) -> TestApp {
    let dir = TempDir::new().unwrap();
    let store = SecretStore::new(dir.path().join("secrets.json"));
    let map: SecretMap = secrets
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    store.save(&map).unwrap();

    let state = Arc::new(GatewayApiState {
        sandbox: Sandbox::new(
            SandboxConfig {
                timeout: Duration::from_secs(10),
                ..Default::default()
            },
            reqwest::Client::new(),
        ),
        secret_store: store,
        catalog: Arc::new(catalog),
        issuer: TransactionIssuer::new(),
        http: reqwest::Client::new(),
        mask_output,
    });
    TestApp { state, _dir: dir }
}

fn default_app() -> TestApp {
    test_app(&[], ServiceCatalog::builtin(), false)
}

async fn post(app: &TestApp, body: Value) -> (u16, Value) {
    let response = build_router(app.state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    read(response).await
}

async fn get(app: &TestApp, uri: &str) -> (u16, Value) {
    let response = build_router(app.state.clone())
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    read(response).await
}

async fn read(response: axum::response::Response) -> (u16, Value) {
    let status = response.status().as_u16();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

// ── Execution ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_post_runs_handler_with_event() {
    let app = default_app();
    let (status, body) = post(
        &app,
        json!({
            "userCode": "exports.handler = |e| #{ body: e.queryParams.x };",
            "event": {"queryParams": {"x": "42"}}
        }),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body, json!({"body": "42"}));
}

#[tokio::test]
async fn test_get_reads_query_string() {
    let app = default_app();
    let code = "exports.handler%20%3D%20%7Ce%7C%20%23%7B%20body%3A%20e.queryParams.x%2C%20m%3A%20e.method%20%7D%3B";
    let (status, body) = get(&app, &format!("/?x=42&userCode={code}")).await;

    assert_eq!(status, 200);
    assert_eq!(body, json!({"body": "42", "m": "GET"}));
}

#[tokio::test]
async fn test_debug_wraps_result_with_console() {
    let app = default_app();
    let (status, body) = post(
        &app,
        json!({
            "userCode": r#"exports.handler = |e| { console::log("hi", 2); console::error("warn"); 7 };"#,
            "debug": true
        }),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(
        body,
        json!({"result": 7, "consoleLogs": [["hi", 2]], "consoleErrors": [["warn"]]})
    );
}

#[tokio::test]
async fn test_handler_throw_is_500_with_message() {
    let app = default_app();
    let (status, body) = post(
        &app,
        json!({"userCode": r#"exports.handler = |e| { throw "kaput"; };"#}),
    )
    .await;

    assert_eq!(status, 500);
    assert!(body["error"].as_str().unwrap().contains("kaput"));
    assert!(body.get("consoleLogs").is_none());
}

#[tokio::test]
async fn test_debug_failure_keeps_console() {
    let app = default_app();
    let (status, body) = post(
        &app,
        json!({
            "userCode": r#"exports.handler = |e| { console::log("step 1"); throw "kaput"; };"#,
            "debug": "true"
        }),
    )
    .await;

    assert_eq!(status, 500);
    assert!(body["error"].as_str().unwrap().contains("kaput"));
    assert_eq!(body["consoleLogs"], json!([["step 1"]]));
}

#[tokio::test]
async fn test_compile_error_is_500() {
    let app = default_app();
    let (status, body) = post(&app, json!({"userCode": "exports.handler = |e| {"})).await;
    assert_eq!(status, 500);
    assert!(body["error"].as_str().unwrap().starts_with("Compile error"));
}

#[tokio::test]
async fn test_missing_code_is_500() {
    let app = default_app();
    let (status, body) = post(&app, json!({"event": {}})).await;
    assert_eq!(status, 500);
    assert_eq!(body, json!({"error": "userCode is required"}));
}

#[tokio::test]
async fn test_malformed_body_is_500_json() {
    let app = default_app();
    let response = build_router(app.state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    let (status, body) = read(response).await;
    assert_eq!(status, 500);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));
}

// ── Secrets ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stored_and_request_secrets_are_rendered() {
    let app = test_app(
        &[("GREETING", "hello"), ("TARGET", "world")],
        ServiceCatalog::builtin(),
        false,
    );
    let (status, body) = post(
        &app,
        json!({
            "userCode": r#"exports.handler = |e| "{{secrets.GREETING}} {{ secrets.TARGET }} {{secrets.UNKNOWN}}";"#,
            "secrets": {"TARGET": "gateway"}
        }),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body, json!("hello gateway {{secrets.UNKNOWN}}"));
}

#[tokio::test]
async fn test_mask_output_redacts_complex_secrets() {
    let app = test_app(
        &[("API_KEY", "Xk29fLmQ7z"), ("PIN", "1234")],
        ServiceCatalog::builtin(),
        true,
    );
    let (status, body) = post(
        &app,
        json!({
            "userCode": r#"exports.handler = |e| #{ key: "{{secrets.API_KEY}}", pin: "{{secrets.PIN}}" };"#
        }),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body, json!({"key": "***MASKED_SECRET***", "pin": "1234"}));
}

#[tokio::test]
async fn test_unmasked_by_default() {
    let app = test_app(&[("API_KEY", "Xk29fLmQ7z")], ServiceCatalog::builtin(), false);
    let (_, body) = post(
        &app,
        json!({"userCode": r#"exports.handler = |e| "{{secrets.API_KEY}}";"#}),
    )
    .await;
    assert_eq!(body, json!("Xk29fLmQ7z"));
}

// ── Metered services ────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_metered_call_without_aes_key_fails_at_remote() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/googleSearch"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&mock)
        .await;

    let catalog = ServiceCatalog::from_entries([(
        catalog::GOOGLE_SEARCH,
        ServiceDescriptor {
            url: format!("{}/googleSearch", mock.uri()),
            account_id: "acct-search".into(),
            pricing: PricingModel::PerRequest(600),
        },
    )]);
    let app = test_app(&[], catalog, false);

    let (status, body) = post(
        &app,
        json!({
            "userCode": r#"exports.handler = |e| services::google_search("rust");"#,
            "walletPrivateKey": "U2FsdGVkX1+not-used-without-a-key",
            "accountId": "acct-caller"
        }),
    )
    .await;

    assert_eq!(status, 500);
    assert!(body["error"].as_str().unwrap().contains("401"));

    let requests = mock.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key(TRANSACTION_HEADER));
}

// ── Ancillary routes ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_options_answers_preflight() {
    let app = default_app();
    let response = build_router(app.state.clone())
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let (status, body) = read(response).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"message": "CORS preflight successful"}));
}

#[tokio::test]
async fn test_cors_preflight_allows_transaction_header() {
    let app = default_app();
    let response = build_router(app.state.clone())
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/")
                .header("origin", "https://app.example")
                .header("access-control-request-method", "POST")
                .header("access-control-request-headers", "content-type,transaction-jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let allowed = response
        .headers()
        .get("access-control-allow-headers")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(allowed.contains("transaction-jwt"));
    assert_eq!(
        response.headers().get("access-control-max-age").unwrap(),
        "600"
    );
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );
    let (_, body) = read(response).await;
    assert_eq!(body, json!({"message": "CORS preflight successful"}));
}

#[tokio::test]
async fn test_preflight_body_on_any_path() {
    let app = default_app();
    let response = build_router(app.state.clone())
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/health")
                .header("origin", "https://app.example")
                .header("access-control-request-method", "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.headers().contains_key("access-control-allow-origin"));
    let (status, body) = read(response).await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "CORS preflight successful");
}

#[tokio::test]
async fn test_health() {
    let app = default_app();
    let (status, body) = get(&app, "/health").await;

    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["capabilityProfile"], "restricted");
    assert_eq!(body["services"], 11);
}
