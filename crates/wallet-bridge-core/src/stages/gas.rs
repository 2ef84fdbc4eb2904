//! Gas estimation done against the chain rather than the widget.

use serde_json::Value;

use crate::domain::JsonRpcRequest;
use crate::error::RpcError;
use crate::pipeline::Next;
use crate::stages::{parse_quantity, quantity};

/// Gas of a plain value transfer.
pub const TRANSFER_GAS: u64 = 21_000;

fn is_empty_data(data: Option<&Value>) -> bool {
    match data.and_then(Value::as_str) {
        None => true,
        Some(data) => data.is_empty() || data == "0x",
    }
}

fn is_empty_code(code: &Value) -> bool {
    matches!(code.as_str(), Some("") | Some("0x") | Some("0x0"))
}

/// Estimates the gas for `tx` by querying the whole chain.
///
/// A transfer without data to an account without code costs exactly
/// [`TRANSFER_GAS`]. Anything else is estimated with the gas capped at 95%
/// of the latest block's gas limit, then padded by half and clamped to that
/// same cap.
pub async fn estimate_tx_gas(
    tx: &Value,
    origin: &JsonRpcRequest,
    next: Next<'_>,
) -> Result<Value, RpcError> {
    let data = tx.get("data").or_else(|| tx.get("input"));
    if let (Some(to), true) = (tx.get("to").and_then(Value::as_str), is_empty_data(data)) {
        let code = next
            .run_from_head(origin.derive("eth_getCode", vec![Value::from(to), Value::from("latest")]))
            .await?;
        if is_empty_code(&code) {
            return Ok(quantity(TRANSFER_GAS));
        }
    }

    let block = next
        .run_from_head(origin.derive(
            "eth_getBlockByNumber",
            vec![Value::from("latest"), Value::Bool(false)],
        ))
        .await?;
    let gas_limit = block
        .get("gasLimit")
        .and_then(parse_quantity)
        .ok_or_else(|| RpcError::internal("latest block has no gasLimit"))?;
    let cap = (u128::from(gas_limit) * 95 / 100) as u64;

    let mut probe = tx.clone();
    if let Some(obj) = probe.as_object_mut() {
        obj.insert("gas".to_owned(), quantity(cap));
    }
    let estimate = next
        .run_from_head(origin.derive("eth_estimateGas", vec![probe]))
        .await?;
    let estimate = parse_quantity(&estimate)
        .ok_or_else(|| RpcError::internal(format!("unparseable gas estimate {estimate}")))?;

    let padded = (u128::from(estimate) * 3 / 2).min(u128::from(cap)) as u64;
    Ok(quantity(padded))
}
