use async_trait::async_trait;
use serde_json::Value;

use crate::context::RequestContext;
use crate::domain::JsonRpcRequest;
use crate::error::RpcError;
use crate::pipeline::{Next, Stage, StageResult};
use crate::stages::{parse_quantity, quantity};

/// Pending-nonce tracker over the active network's scope.
///
/// Transaction submissions on one network are serialized so that two sends
/// from the same account never pick the same nonce.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonceStage;

impl NonceStage {
    async fn pending_count(
        &self,
        request: JsonRpcRequest,
        ctx: &RequestContext,
        next: Next<'_>,
    ) -> StageResult {
        let address = match request.param(0).and_then(Value::as_str) {
            Some(address) => address.to_ascii_lowercase(),
            None => return next.run(request).await,
        };
        if let Some(nonce) = ctx.scope.nonce(&address) {
            return Ok(quantity(nonce));
        }
        let result = next.run(request).await?;
        if let Some(nonce) = parse_quantity(&result) {
            ctx.scope.advance_nonce(&address, nonce);
        }
        Ok(result)
    }

    async fn send(
        &self,
        mut request: JsonRpcRequest,
        ctx: &RequestContext,
        next: Next<'_>,
    ) -> StageResult {
        let from = request
            .param(0)
            .and_then(|tx| tx.get("from"))
            .and_then(Value::as_str)
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| RpcError::invalid_params("eth_sendTransaction requires a 'from' address"))?;

        let _serialized = ctx.scope.lock_sends().await;

        let explicit = request
            .param(0)
            .and_then(|tx| tx.get("nonce"))
            .and_then(parse_quantity);
        let nonce = match explicit {
            Some(nonce) => nonce,
            None => {
                let nonce = match ctx.scope.nonce(&from) {
                    Some(nonce) => nonce,
                    None => {
                        let count = next
                            .run(request.derive(
                                "eth_getTransactionCount",
                                vec![Value::String(from.clone()), Value::from("pending")],
                            ))
                            .await?;
                        parse_quantity(&count).ok_or_else(|| {
                            RpcError::internal(format!("unparseable transaction count {count}"))
                        })?
                    }
                };
                if let Some(tx) = request.params.get_mut(0).and_then(Value::as_object_mut) {
                    tx.insert("nonce".to_owned(), quantity(nonce));
                }
                nonce
            }
        };

        let result = next.run(request).await?;
        ctx.scope.advance_nonce(&from, nonce.saturating_add(1));
        tracing::debug!(from = %from, nonce, "transaction submitted");
        Ok(result)
    }
}

#[async_trait]
impl Stage for NonceStage {
    async fn handle(
        &self,
        request: JsonRpcRequest,
        ctx: &RequestContext,
        next: Next<'_>,
    ) -> StageResult {
        let pending = request.method == "eth_getTransactionCount"
            && request.param(1).and_then(Value::as_str) == Some("pending");
        if pending {
            return self.pending_count(request, ctx, next).await;
        }
        if request.method == "eth_sendTransaction" {
            return self.send(request, ctx, next).await;
        }
        next.run(request).await
    }
}
