use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Compile error: {0}")]
    Compile(String),

    #[error("Handler error: {0}")]
    HandlerRuntime(String),

    #[error("Execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("Script does not export a handler (assign exports.handler or define fn handler(event))")]
    MissingEntryPoint,

    #[error("Authorization unavailable: {0}")]
    AuthorizationUnavailable(String),

    #[error("Unknown service: {0}")]
    ServiceLookupMiss(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sandbox failure: {0}")]
    Sandbox(String),
}

impl GatewayError {
    /// Failures raised by the user's script rather than by the gateway itself.
    pub fn is_script_failure(&self) -> bool {
        matches!(
            self,
            GatewayError::Compile(_)
                | GatewayError::HandlerRuntime(_)
                | GatewayError::MissingEntryPoint
        )
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Http(e.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Serialization(e.to_string())
    }
}
