pub mod payload;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::middleware::{self, Next};
use axum::response::Response;
use tower_http::cors::{AllowOrigin, CorsLayer};

use gateway_runtime::metered::TRANSACTION_HEADER;
use gateway_runtime::{Sandbox, SecretStore, ServiceCatalog, TransactionIssuer};

/// Shared state of the gateway API. Everything here is read-only while
/// requests are served.
pub struct GatewayApiState {
    pub sandbox: Sandbox,
    pub secret_store: SecretStore,
    pub catalog: Arc<ServiceCatalog>,
    pub issuer: TransactionIssuer,
    /// Client used for metered service calls.
    pub http: reqwest::Client,
    /// Redact complex secret values from every response.
    pub mask_output: bool,
}

pub fn cors_layer() -> CorsLayer {
    let origins = std::env::var("CORS_ALLOWED_ORIGINS").unwrap_or_default();
    let allow_origin = if origins == "*" || origins.is_empty() {
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(TRANSACTION_HEADER)])
        .max_age(Duration::from_secs(600))
}

pub const PREFLIGHT_BODY: &str = r#"{"message":"CORS preflight successful"}"#;

/// `CorsLayer` answers OPTIONS itself with an empty body; keep its headers
/// and status but give clients the JSON acknowledgement.
pub async fn preflight_body(request: Request, next: Next) -> Response {
    let is_preflight = request.method() == Method::OPTIONS;
    let response = next.run(request).await;
    if !is_preflight {
        return response;
    }

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Response::from_parts(parts, Body::from(PREFLIGHT_BODY))
}

pub fn build_router(state: Arc<GatewayApiState>) -> Router {
    Router::new()
        .merge(routes::health::router())
        .merge(routes::execute::router())
        .layer(cors_layer())
        .layer(middleware::from_fn(preflight_body))
        .with_state(state)
}
