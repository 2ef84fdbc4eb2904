use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::RequestContext;
use crate::domain::JsonRpcRequest;
use crate::error::RpcError;
use crate::pipeline::{Next, Stage, StageResult};

/// Emulates `eth_subscribe` on top of polling filters.
///
/// Each subscription is backed by a filter installed downstream; there is
/// no push channel, callers poll with `eth_getFilterChanges` on the filter
/// returned by [`SubscriptionStage::filter_for`].
#[derive(Debug, Default)]
pub struct SubscriptionStage {
    next_id: AtomicU64,
    filters: Mutex<HashMap<String, String>>,
}

impl SubscriptionStage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter_for(&self, subscription_id: &str) -> Option<String> {
        lock_or_recover!(self.filters).get(subscription_id).cloned()
    }

    async fn subscribe(&self, request: &JsonRpcRequest, next: Next<'_>) -> StageResult {
        let kind = request.param(0).and_then(Value::as_str).unwrap_or_default();
        let install = match kind {
            "newHeads" => request.derive("eth_newBlockFilter", Vec::new()),
            "newPendingTransactions" => {
                request.derive("eth_newPendingTransactionFilter", Vec::new())
            }
            "logs" => request.derive(
                "eth_newFilter",
                vec![request.param(1).cloned().unwrap_or_else(|| json!({}))],
            ),
            other => {
                return Err(RpcError::invalid_params(format!(
                    "unsupported subscription type {other:?}"
                )))
            }
        };

        let filter_id = next.run(install).await?;
        let filter_id = filter_id
            .as_str()
            .ok_or_else(|| RpcError::internal(format!("node returned filter id {filter_id}")))?
            .to_owned();
        let subscription_id = format!("0x{:x}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        lock_or_recover!(self.filters).insert(subscription_id.clone(), filter_id);
        tracing::debug!(%subscription_id, kind, "subscription installed");
        Ok(Value::String(subscription_id))
    }

    async fn unsubscribe(&self, request: &JsonRpcRequest, next: Next<'_>) -> StageResult {
        let subscription_id = request
            .param(0)
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("eth_unsubscribe expects a subscription id"))?;
        let filter_id = lock_or_recover!(self.filters).remove(subscription_id);
        match filter_id {
            Some(filter_id) => {
                next.run(request.derive("eth_uninstallFilter", vec![json!(filter_id)]))
                    .await
            }
            None => Ok(Value::Bool(false)),
        }
    }
}

#[async_trait]
impl Stage for SubscriptionStage {
    async fn handle(
        &self,
        request: JsonRpcRequest,
        _ctx: &RequestContext,
        next: Next<'_>,
    ) -> StageResult {
        match request.method.as_str() {
            "eth_subscribe" => self.subscribe(&request, next).await,
            "eth_unsubscribe" => self.unsubscribe(&request, next).await,
            _ => next.run(request).await,
        }
    }
}
