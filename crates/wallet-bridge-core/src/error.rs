use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Every failure the SDK can report.
///
/// Construction-time problems (`Configuration`, `NetworkDescriptor`) and
/// `UnsupportedSyncCall` are returned synchronously. `Bridge`, `Relay` and
/// `Timeout` are asynchronous and reach callers as an [`RpcError`] inside a
/// JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SdkError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("network descriptor error: {0}")]
    NetworkDescriptor(String),
    #[error("bridge error: {0}")]
    Bridge(String),
    #[error("relay error: {0}")]
    Relay(String),
    #[error("unsupported synchronous call: {method} requires the asynchronous provider path")]
    UnsupportedSyncCall { method: String },
    #[error("timed out after {timeout_ms}ms waiting for {operation}")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },
    #[error("validation error: {0}")]
    Validation(String),
}

pub const CODE_INTERNAL: i64 = -32603;
pub const CODE_INVALID_PARAMS: i64 = -32602;
pub const CODE_METHOD_NOT_FOUND: i64 = -32601;
pub const CODE_BRIDGE: i64 = -32001;
pub const CODE_RELAY: i64 = -32002;
pub const CODE_TIMEOUT: i64 = -32003;

/// Error half of an internal `{error, result: null}` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(CODE_INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(CODE_INTERNAL, message)
    }

    /// Normalizes whatever the widget or a relay node put in its `error`
    /// slot. Strings become the message; JSON-RPC error objects keep their
    /// code; anything else is stringified.
    pub fn from_remote(value: &Value, fallback_code: i64) -> Self {
        match value {
            Value::String(message) => Self::new(fallback_code, message.clone()),
            Value::Object(obj) => {
                let code = obj
                    .get("code")
                    .and_then(Value::as_i64)
                    .unwrap_or(fallback_code);
                let message = obj
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_owned)
                    .unwrap_or_else(|| value.to_string());
                Self {
                    code,
                    message,
                    data: obj.get("data").cloned(),
                }
            }
            other => Self::new(fallback_code, other.to_string()),
        }
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl From<SdkError> for RpcError {
    fn from(err: SdkError) -> Self {
        let code = match &err {
            SdkError::Bridge(_) => CODE_BRIDGE,
            SdkError::Relay(_) => CODE_RELAY,
            SdkError::Timeout { .. } => CODE_TIMEOUT,
            SdkError::Validation(_) => CODE_INVALID_PARAMS,
            SdkError::UnsupportedSyncCall { .. } => CODE_METHOD_NOT_FOUND,
            SdkError::Configuration(_) | SdkError::NetworkDescriptor(_) => CODE_INTERNAL,
        };
        Self::new(code, err.to_string())
    }
}
