//! Web3-style provider façade over the pipeline.
//!
//! Two explicit entry points: [`LegacyProvider::send_sync`] answers the few
//! methods that can be served from session state, everything else goes
//! through [`LegacyProvider::send`] / [`LegacyProvider::send_async`].

use std::sync::Arc;

use serde_json::Value;

use crate::domain::{JsonRpcRequest, JsonRpcResponse, DEFAULT_REQUEST_ID};
use crate::error::{RpcError, SdkError};
use crate::pipeline::Pipeline;
use crate::session::SessionState;

#[derive(Clone)]
pub struct LegacyProvider {
    pipeline: Arc<Pipeline>,
    session: Arc<SessionState>,
}

impl std::fmt::Debug for LegacyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegacyProvider")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl LegacyProvider {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        let session = Arc::clone(pipeline.context().session());
        Self { pipeline, session }
    }

    /// Answers from session state without any remote round trip.
    ///
    /// `eth_uninstallFilter` is dispatched in the background and answered
    /// `true` right away. Any other method is
    /// [`SdkError::UnsupportedSyncCall`].
    pub fn send_sync(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, SdkError> {
        let result = match request.method.as_str() {
            "eth_accounts" | "eth_coinbase" => {
                Value::from(self.session.selected_address().into_iter().collect::<Vec<_>>())
            }
            "net_version" => self
                .session
                .network_version()
                .map_or(Value::Null, Value::String),
            "eth_uninstallFilter" => {
                let handle = tokio::runtime::Handle::try_current().map_err(|_| {
                    SdkError::UnsupportedSyncCall {
                        method: request.method.clone(),
                    }
                })?;
                let pipeline = Arc::clone(&self.pipeline);
                let background = request.clone();
                handle.spawn(async move {
                    let response = pipeline.dispatch(background).await;
                    if let Some(err) = response.error {
                        tracing::warn!(error = %err, "background eth_uninstallFilter failed");
                    }
                });
                Value::Bool(true)
            }
            other => {
                return Err(SdkError::UnsupportedSyncCall {
                    method: other.to_owned(),
                })
            }
        };
        Ok(JsonRpcResponse::from_outcome(request, Ok(result)))
    }

    /// `send(method, params)`: builds a request with the default id and
    /// resolves to its result.
    pub async fn send(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        self.pipeline
            .dispatch(JsonRpcRequest::new(DEFAULT_REQUEST_ID, method, params))
            .await
            .into_result()
    }

    pub async fn send_async(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        self.pipeline.dispatch(request).await
    }

    /// Asks the wallet for its accounts, logging the user in when needed.
    pub async fn enable(&self) -> Result<Vec<String>, RpcError> {
        let result = self
            .pipeline
            .dispatch(JsonRpcRequest::new(Value::Null, "eth_accounts", Vec::new()))
            .await
            .into_result()?;
        serde_json::from_value(result)
            .map_err(|e| RpcError::internal(format!("unexpected eth_accounts result: {e}")))
    }

    pub fn is_connected(&self) -> bool {
        true
    }

    pub fn is_portis(&self) -> bool {
        true
    }

    pub fn network_version(&self) -> Option<String> {
        self.session.network_version()
    }

    pub fn selected_address(&self) -> Option<String> {
        self.session.selected_address()
    }
}
