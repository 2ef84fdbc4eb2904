use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::bridge::Bridge;
use crate::context::RequestContext;
use crate::domain::JsonRpcRequest;
use crate::error::{RpcError, CODE_RELAY};
use crate::pipeline::{StageResult, TerminalStage};
use crate::ports::RelayBackend;
use crate::session::SessionState;

/// Last stage of every pipeline: hands the request to the configured
/// backend and records `net_version` answers in the session.
pub struct RelayStage {
    backend: Arc<dyn RelayBackend>,
    session: Arc<SessionState>,
}

impl RelayStage {
    pub fn new(backend: Arc<dyn RelayBackend>, session: Arc<SessionState>) -> Self {
        tracing::debug!(backend = backend.name(), "relay backend selected");
        Self { backend, session }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}

#[async_trait]
impl TerminalStage for RelayStage {
    async fn handle(&self, request: JsonRpcRequest, ctx: &RequestContext) -> StageResult {
        let result = self.backend.relay(&request, ctx).await?;
        if request.method == "net_version" {
            let version = match &result {
                Value::String(version) => Some(version.clone()),
                Value::Number(number) => Some(number.to_string()),
                _ => None,
            };
            if let Some(version) = version {
                self.session.set_network_version(version);
            }
        }
        Ok(result)
    }
}

/// Relays through the widget, which talks to the configured node.
#[derive(Debug)]
pub struct DirectRelay {
    bridge: Arc<Bridge>,
}

impl DirectRelay {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl RelayBackend for DirectRelay {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn relay(
        &self,
        request: &JsonRpcRequest,
        ctx: &RequestContext,
    ) -> Result<Value, RpcError> {
        let reply = self.bridge.relay(request, &ctx.config).await?;
        if reply.is_error() {
            let error = reply.error.unwrap_or(Value::Null);
            return Err(RpcError::from_remote(&error, CODE_RELAY));
        }
        Ok(reply.result.unwrap_or(Value::Null))
    }
}
