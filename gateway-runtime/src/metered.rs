use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value, json};

use crate::authorization::TransactionProvider;
use crate::catalog::{self, ServiceCatalog};
use crate::error::GatewayError;

/// Header carrying the transaction authorization token.
pub const TRANSACTION_HEADER: &str = "transaction-jwt";

/// Per-call options for [`MeteredServiceClient::call`].
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// Spending cap for this call's token.
    pub max_amount: Option<u64>,
    pub timeout: Option<Duration>,
}

/// Raw response of a metered service.
#[derive(Debug, Clone)]
pub struct ServiceResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl ServiceResponse {
    pub fn json(&self) -> Result<Value, GatewayError> {
        if self.body.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Client for the paid services in the catalog. Every request gets a fresh
/// token from the execution's [`TransactionProvider`].
#[derive(Clone)]
pub struct MeteredServiceClient {
    client: reqwest::Client,
    catalog: Arc<ServiceCatalog>,
    provider: Arc<dyn TransactionProvider>,
}

impl std::fmt::Debug for MeteredServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeteredServiceClient")
            .field("services", &self.catalog.len())
            .finish_non_exhaustive()
    }
}

/// Whether a parameter should be sent. Mirrors a JavaScript truthiness check.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn merged(base: Map<String, Value>, extra: Map<String, Value>) -> Map<String, Value> {
    let mut out = base;
    out.extend(extra);
    out
}

impl MeteredServiceClient {
    pub fn new(
        client: reqwest::Client,
        catalog: Arc<ServiceCatalog>,
        provider: Arc<dyn TransactionProvider>,
    ) -> Self {
        Self {
            client,
            catalog,
            provider,
        }
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    /// GET `endpoint` with `params` as query string and a freshly issued
    /// token for `payee_account_id`. Without a token the header is omitted
    /// and the service decides.
    pub async fn call(
        &self,
        endpoint: &str,
        payee_account_id: &str,
        params: &Map<String, Value>,
        config: &RequestConfig,
    ) -> Result<ServiceResponse, GatewayError> {
        let mut url = url::Url::parse(endpoint)
            .map_err(|e| GatewayError::Config(format!("invalid service url {endpoint}: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params.iter().filter(|(_, v)| is_present(v)) {
                query.append_pair(key, &query_value(value));
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        let token = self.provider.authorize(payee_account_id, config.max_amount).await;
        if token.is_none() {
            tracing::debug!(%endpoint, "calling metered service without a transaction token");
        }

        let mut request = self.client.get(url);
        if let Some(token) = token {
            request = request.header(TRANSACTION_HEADER, token);
        }
        if let Some(timeout) = config.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        if !status.is_success() {
            let detail = String::from_utf8_lossy(&body);
            return Err(GatewayError::Http(format!(
                "{endpoint} responded {}: {}",
                status.as_u16(),
                detail.chars().take(512).collect::<String>()
            )));
        }

        Ok(ServiceResponse {
            status: status.as_u16(),
            content_type,
            body,
        })
    }

    /// [`call`](Self::call) with the payee taken from the catalog entry
    /// whose URL is `endpoint`.
    pub async fn call_catalog_url(
        &self,
        endpoint: &str,
        params: &Map<String, Value>,
        config: &RequestConfig,
    ) -> Result<ServiceResponse, GatewayError> {
        let service = self.catalog.find_by_url(endpoint)?;
        self.call(&service.url, &service.account_id, params, config).await
    }

    async fn call_named(
        &self,
        name: &str,
        params: Map<String, Value>,
    ) -> Result<Value, GatewayError> {
        let service = self.catalog.get(name)?;
        self.call(&service.url, &service.account_id, &params, &RequestConfig::default())
            .await?
            .json()
    }

    /// Generate an image. `params.serviceId` picks the model.
    pub async fn text_to_image(
        &self,
        prompt: &str,
        mut params: Map<String, Value>,
    ) -> Result<Value, GatewayError> {
        let service_id = match params.remove("serviceId") {
            Some(Value::String(id)) => id,
            _ => catalog::DEFAULT_IMAGE_SERVICE.to_string(),
        };
        let service = self.catalog.get(&service_id)?;

        let mut query = Map::new();
        query.insert("prompt".into(), json!(prompt));
        let response = self
            .call(
                &service.url,
                &service.account_id,
                &merged(query, params),
                &RequestConfig::default(),
            )
            .await?;

        Ok(json!({
            "ContentType": response.content_type,
            "base64Data": STANDARD.encode(&response.body),
        }))
    }

    pub async fn speech_to_text(
        &self,
        audio_url: &str,
        params: Map<String, Value>,
    ) -> Result<Value, GatewayError> {
        let mut query = Map::new();
        query.insert("audio".into(), json!(audio_url));
        self.call_named(catalog::WHISPER_LARGE_V3, merged(query, params)).await
    }

    pub async fn webpage_to_text(
        &self,
        page_url: &str,
        params: Map<String, Value>,
    ) -> Result<Value, GatewayError> {
        let mut query = Map::new();
        query.insert("url".into(), json!(page_url));
        self.call_named(catalog::READ_WEBPAGE, merged(query, params)).await
    }

    /// Web search; returns the result `items` only.
    pub async fn google_search(
        &self,
        q: &str,
        params: Map<String, Value>,
    ) -> Result<Value, GatewayError> {
        let mut query = Map::new();
        query.insert("q".into(), json!(q));
        let data = self.call_named(catalog::GOOGLE_SEARCH, merged(query, params)).await?;
        Ok(data.get("items").cloned().unwrap_or(Value::Null))
    }

    pub async fn document_to_text(
        &self,
        document_url: &str,
        params: Map<String, Value>,
    ) -> Result<Value, GatewayError> {
        let mut query = Map::new();
        query.insert("url".into(), json!(document_url));
        self.call_named(catalog::DOCUMENT_TO_TEXT, merged(query, params)).await
    }

    /// Detect text in an image. With `textOnly`, only the first detection's
    /// text is returned.
    pub async fn image_to_text(
        &self,
        image_url: &str,
        params: Map<String, Value>,
    ) -> Result<Value, GatewayError> {
        let text_only = params.get("textOnly").is_some_and(is_present);
        let mut query = Map::new();
        query.insert("url".into(), json!(image_url));
        let data = self.call_named(catalog::TEXT_DETECTION, merged(query, params)).await?;

        if text_only {
            if let Some(txt) = data.pointer("/detections/0/txt").filter(|t| is_present(t)) {
                return Ok(json!({ "detections": txt }));
            }
        }
        Ok(data)
    }

    pub async fn translate(&self, text: &str, to: &str) -> Result<Value, GatewayError> {
        let mut query = Map::new();
        query.insert("text".into(), json!(text));
        query.insert("method".into(), json!("translate"));
        query.insert("to".into(), json!(to));
        self.call_named(catalog::TRANSLATE_TEXT, query).await
    }

    pub async fn detect_language(
        &self,
        text: &str,
        params: Map<String, Value>,
    ) -> Result<Value, GatewayError> {
        let mut query = Map::new();
        query.insert("text".into(), json!(text));
        query.insert("method".into(), json!("detect"));
        self.call_named(catalog::TRANSLATE_TEXT, merged(query, params)).await
    }

    pub async fn text_to_speech(
        &self,
        text: &str,
        params: Map<String, Value>,
    ) -> Result<Value, GatewayError> {
        let mut query = Map::new();
        query.insert("text".into(), json!(text));
        self.call_named(catalog::TEXT_TO_SPEECH, merged(query, params)).await
    }
}
