use async_trait::async_trait;
use serde_json::Value;

use crate::context::RequestContext;
use crate::domain::JsonRpcRequest;
use crate::pipeline::{Next, Stage, StageResult};

/// Results that can never change once known.
const PERMANENT: &[&str] = &[
    "eth_chainId",
    "eth_protocolVersion",
    "web3_sha3",
    "eth_getBlockByHash",
    "eth_getBlockTransactionCountByHash",
    "eth_getUncleCountByBlockHash",
    "eth_getTransactionByBlockHashAndIndex",
    "eth_getUncleByBlockHashAndIndex",
    "eth_getTransactionByHash",
    "eth_getTransactionReceipt",
];

/// Methods whose answer is fixed once pinned to a block, with the position
/// of their block parameter.
const BLOCK_PINNED: &[(&str, usize)] = &[
    ("eth_getBalance", 1),
    ("eth_getCode", 1),
    ("eth_getTransactionCount", 1),
    ("eth_getStorageAt", 2),
    ("eth_call", 1),
    ("eth_getBlockByNumber", 0),
    ("eth_getBlockTransactionCountByNumber", 0),
    ("eth_getUncleCountByBlockNumber", 0),
    ("eth_getTransactionByBlockNumberAndIndex", 0),
    ("eth_getUncleByBlockNumberAndIndex", 0),
];

/// Response cache over the active network's scope.
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStage;

impl CacheStage {
    pub fn cache_key(request: &JsonRpcRequest) -> Option<String> {
        if !Self::is_cacheable(request) {
            return None;
        }
        Some(format!(
            "{}:{}",
            request.method,
            Value::Array(request.params.clone())
        ))
    }

    fn is_cacheable(request: &JsonRpcRequest) -> bool {
        if PERMANENT.contains(&request.method.as_str()) {
            return true;
        }
        BLOCK_PINNED
            .iter()
            .find(|(method, _)| *method == request.method)
            .and_then(|(_, index)| request.param(*index))
            .and_then(Value::as_str)
            .is_some_and(is_fixed_block)
    }
}

fn is_fixed_block(tag: &str) -> bool {
    tag == "earliest" || (tag.starts_with("0x") && tag.len() > 2)
}

/// A transaction still in the mempool has no block hash yet.
fn worth_keeping(method: &str, result: &Value) -> bool {
    if result.is_null() {
        return false;
    }
    if method == "eth_getTransactionByHash" {
        return result.get("blockHash").is_some_and(|hash| !hash.is_null());
    }
    true
}

#[async_trait]
impl Stage for CacheStage {
    async fn handle(
        &self,
        request: JsonRpcRequest,
        ctx: &RequestContext,
        next: Next<'_>,
    ) -> StageResult {
        let Some(key) = Self::cache_key(&request) else {
            return next.run(request).await;
        };
        if let Some(hit) = ctx.scope.cached(&key) {
            tracing::debug!(method = %request.method, "cache hit");
            return Ok(hit);
        }

        let method = request.method.clone();
        let result = next.run(request).await?;
        if worth_keeping(&method, &result) {
            ctx.scope.store(key, result.clone());
        }
        Ok(result)
    }
}
