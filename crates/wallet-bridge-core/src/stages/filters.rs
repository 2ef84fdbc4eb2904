use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::RequestContext;
use crate::domain::JsonRpcRequest;
use crate::error::RpcError;
use crate::pipeline::{Next, Stage, StageResult};

const INSTALL: &[&str] = &[
    "eth_newFilter",
    "eth_newBlockFilter",
    "eth_newPendingTransactionFilter",
];
const POLL: &[&str] = &["eth_getFilterChanges", "eth_getFilterLogs"];

/// Keeps track of the filters installed through this provider.
#[derive(Debug, Default)]
pub struct FilterStage {
    installed: Mutex<HashSet<String>>,
}

impl FilterStage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_installed(&self, filter_id: &str) -> bool {
        lock_or_recover!(self.installed).contains(&normalize(filter_id))
    }
}

fn normalize(filter_id: &str) -> String {
    filter_id.to_ascii_lowercase()
}

fn filter_id_param(request: &JsonRpcRequest) -> Result<String, RpcError> {
    request
        .param(0)
        .and_then(Value::as_str)
        .map(normalize)
        .ok_or_else(|| RpcError::invalid_params(format!("{} expects a filter id", request.method)))
}

#[async_trait]
impl Stage for FilterStage {
    async fn handle(
        &self,
        request: JsonRpcRequest,
        _ctx: &RequestContext,
        next: Next<'_>,
    ) -> StageResult {
        let method = request.method.as_str();
        if INSTALL.contains(&method) {
            let result = next.run(request).await?;
            if let Some(id) = result.as_str() {
                lock_or_recover!(self.installed).insert(normalize(id));
            }
            return Ok(result);
        }
        if method == "eth_uninstallFilter" {
            let id = filter_id_param(&request)?;
            let known = lock_or_recover!(self.installed).remove(&id);
            if !known {
                return Ok(Value::Bool(false));
            }
            return next.run(request).await;
        }
        if POLL.contains(&method) {
            let id = filter_id_param(&request)?;
            if !self.is_installed(&id) {
                return Err(RpcError::invalid_params(format!("filter {id} not found")));
            }
        }
        next.run(request).await
    }
}
