use std::sync::Arc;

use alloy::primitives::Address;
use async_trait::async_trait;
use serde_json::Value;

use crate::bridge::Bridge;
use crate::context::RequestContext;
use crate::domain::{JsonRpcRequest, MessageParams, MessageStandard, WidgetReply};
use crate::error::{RpcError, SdkError, CODE_BRIDGE};
use crate::pipeline::{Next, Stage, StageResult};
use crate::session::SessionState;
use crate::stages::gas::estimate_tx_gas;

/// Account and signing methods, delegated to the widget.
#[derive(Debug)]
pub struct WalletStage {
    bridge: Arc<Bridge>,
    session: Arc<SessionState>,
}

/// Widget transport failures and widget-reported errors both become the
/// error half of the response.
fn settle<T>(reply: Result<WidgetReply<T>, SdkError>) -> Result<Option<T>, RpcError> {
    let reply = reply?;
    if reply.is_error() {
        let error = reply.error.unwrap_or(Value::Null);
        return Err(RpcError::from_remote(&error, CODE_BRIDGE));
    }
    Ok(reply.result)
}

fn resembles_address(value: &Value) -> bool {
    value
        .as_str()
        .is_some_and(|s| s.starts_with("0x") && s.parse::<Address>().is_ok())
}

fn string_param(request: &JsonRpcRequest, index: usize) -> Result<String, RpcError> {
    request
        .param(index)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| {
            RpcError::invalid_params(format!(
                "{} expects a string at position {index}",
                request.method
            ))
        })
}

fn tx_param(request: &JsonRpcRequest) -> Result<Value, RpcError> {
    match request.param(0) {
        Some(tx @ Value::Object(_)) => Ok(tx.clone()),
        _ => Err(RpcError::invalid_params(format!(
            "{} expects a transaction object",
            request.method
        ))),
    }
}

impl WalletStage {
    pub fn new(bridge: Arc<Bridge>, session: Arc<SessionState>) -> Self {
        Self { bridge, session }
    }

    /// The only path that may change the selected address.
    pub async fn get_accounts(&self, ctx: &RequestContext) -> Result<Vec<String>, RpcError> {
        let accounts = settle(self.bridge.get_accounts(&ctx.config).await)?.unwrap_or_default();
        self.session.set_selected_address(accounts.first().cloned());
        Ok(accounts)
    }

    pub async fn sign_transaction(&self, tx: Value, ctx: &RequestContext) -> StageResult {
        Ok(settle(self.bridge.sign_transaction(tx, &ctx.config).await)?.unwrap_or(Value::Null))
    }

    pub async fn sign_message(
        &self,
        from: String,
        data: Value,
        standard: MessageStandard,
        ctx: &RequestContext,
    ) -> StageResult {
        let params = MessageParams {
            from,
            data,
            message_standard: standard,
        };
        Ok(settle(self.bridge.sign_message(&params, &ctx.config).await)?.unwrap_or(Value::Null))
    }

    /// Leaves the price to the widget.
    pub fn get_gas_price(&self) -> Option<Value> {
        None
    }

    async fn send_transaction(
        &self,
        request: &JsonRpcRequest,
        ctx: &RequestContext,
        next: Next<'_>,
    ) -> StageResult {
        let mut tx = tx_param(request)?;
        if tx.get("from").and_then(Value::as_str).is_none() {
            return Err(RpcError::invalid_params(
                "eth_sendTransaction requires a 'from' address",
            ));
        }
        if tx.get("gas").is_none() {
            let gas = estimate_tx_gas(&tx, request, next).await?;
            if let Some(obj) = tx.as_object_mut() {
                obj.insert("gas".to_owned(), gas);
            }
        }
        if tx.get("gasPrice").is_none() {
            if let (Some(price), Some(obj)) = (self.get_gas_price(), tx.as_object_mut()) {
                obj.insert("gasPrice".to_owned(), price);
            }
        }

        let signed = self.sign_transaction(tx, ctx).await?;
        let raw = signed
            .as_str()
            .or_else(|| signed.get("raw").and_then(Value::as_str))
            .ok_or_else(|| RpcError::new(CODE_BRIDGE, "widget returned no raw transaction"))?
            .to_owned();
        next.run_from_head(request.derive("eth_sendRawTransaction", vec![Value::String(raw)]))
            .await
    }

    async fn sign_request(
        &self,
        request: &JsonRpcRequest,
        ctx: &RequestContext,
    ) -> Option<StageResult> {
        let (from, data, standard) = match request.method.as_str() {
            "eth_sign" => (
                string_param(request, 0),
                request.param(1).cloned(),
                MessageStandard::Plain,
            ),
            "personal_sign" => {
                let first = request.param(0).cloned().unwrap_or(Value::Null);
                let second = request.param(1).cloned().unwrap_or(Value::Null);
                let (address, message) = if resembles_address(&first) && !resembles_address(&second) {
                    (first, second)
                } else {
                    (second, first)
                };
                (
                    address
                        .as_str()
                        .map(str::to_owned)
                        .ok_or_else(|| RpcError::invalid_params("personal_sign expects an address")),
                    Some(message),
                    MessageStandard::Personal,
                )
            }
            "eth_signTypedData" => (
                string_param(request, 1),
                request.param(0).cloned(),
                MessageStandard::TypedV1,
            ),
            "eth_signTypedData_v3" => (
                string_param(request, 0),
                request.param(1).cloned(),
                MessageStandard::TypedV3,
            ),
            _ => return None,
        };
        let outcome = async {
            let from = from?;
            let data = data
                .filter(|d| !d.is_null())
                .ok_or_else(|| RpcError::invalid_params(format!("{} expects a message", request.method)))?;
            self.sign_message(from, data, standard, ctx).await
        };
        Some(outcome.await)
    }
}

#[async_trait]
impl Stage for WalletStage {
    async fn handle(
        &self,
        request: JsonRpcRequest,
        ctx: &RequestContext,
        next: Next<'_>,
    ) -> StageResult {
        match request.method.as_str() {
            "eth_accounts" | "eth_requestAccounts" => {
                return Ok(Value::from(self.get_accounts(ctx).await?));
            }
            "eth_coinbase" => {
                let accounts = self.get_accounts(ctx).await?;
                return Ok(accounts.into_iter().next().map_or(Value::Null, Value::String));
            }
            "eth_signTransaction" => {
                let tx = tx_param(&request)?;
                return self.sign_transaction(tx, ctx).await;
            }
            "eth_sendTransaction" => return self.send_transaction(&request, ctx, next).await,
            _ => {}
        }
        if let Some(outcome) = self.sign_request(&request, ctx).await {
            return outcome;
        }
        next.run(request).await
    }
}
