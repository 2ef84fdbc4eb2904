//! Relay through a network of relay nodes, optionally requiring several
//! nodes to agree on the answer.
//!
//! The relayed chain is the `chainId` of the network active for each
//! request, so a network switch moves the relay along with the cache.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;

use wallet_bridge_core::error::CODE_RELAY;
use wallet_bridge_core::{
    DecentralizedParams, JsonRpcRequest, RelayBackend, RequestContext, RpcError, SdkError,
};

use crate::AdapterConfig;

#[derive(Debug, Serialize)]
struct RelayBody<'a> {
    blockchain: &'static str,
    netid: &'a str,
    devid: &'a str,
    data: String,
}

#[derive(Debug)]
pub struct DecentralizedRelay {
    client: reqwest::Client,
    dev_id: String,
    dispatchers: Vec<String>,
    consensus_nodes: usize,
    cursor: AtomicUsize,
}

impl DecentralizedRelay {
    pub fn new(params: &DecentralizedParams, config: &AdapterConfig) -> Result<Self, SdkError> {
        if params.dev_id.trim().is_empty() {
            return Err(SdkError::Configuration(
                "decentralized relay requires a developer id".to_owned(),
            ));
        }
        let dispatchers = if params.dispatchers.is_empty() {
            config.default_dispatchers.clone()
        } else {
            params.dispatchers.clone()
        };
        if params.consensus_nodes == 0 || params.consensus_nodes > dispatchers.len() {
            return Err(SdkError::Configuration(format!(
                "consensus over {} nodes needs at least that many dispatchers, have {}",
                params.consensus_nodes,
                dispatchers.len()
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(config.relay_timeout())
            .build()
            .map_err(|e| SdkError::Configuration(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            dev_id: params.dev_id.clone(),
            dispatchers,
            consensus_nodes: params.consensus_nodes,
            cursor: AtomicUsize::new(0),
        })
    }

    fn pick_nodes(&self) -> Vec<&str> {
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        (0..self.consensus_nodes)
            .map(|i| self.dispatchers[(start + i) % self.dispatchers.len()].as_str())
            .collect()
    }

    async fn relay_once(
        &self,
        dispatcher: &str,
        netid: &str,
        data: &str,
    ) -> Result<Value, RpcError> {
        let url = format!("{}/v1/relay", dispatcher.trim_end_matches('/'));
        let body = RelayBody {
            blockchain: "ETH",
            netid,
            devid: &self.dev_id,
            data: data.to_owned(),
        };
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SdkError::Relay(format!("relay node {dispatcher} unreachable: {e}")))?;
        let text = response
            .text()
            .await
            .map_err(|e| SdkError::Relay(format!("relay node {dispatcher} body unreadable: {e}")))?;
        parse_relay_response(&text)
    }
}

/// A relay answer is usable only when it is a JSON-RPC response with a
/// non-null result and no error.
fn parse_relay_response(text: &str) -> Result<Value, RpcError> {
    let body: Value = serde_json::from_str(text)
        .map_err(|e| SdkError::Relay(format!("relay response is not JSON: {e}")))?;
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        return Err(RpcError::from_remote(error, CODE_RELAY));
    }
    match body.get("result") {
        None | Some(Value::Null) => Err(SdkError::Relay("relay returned a null result".to_owned()).into()),
        Some(result) => Ok(result.clone()),
    }
}

/// The answer more than half of `total` nodes agree on.
fn majority(answers: Vec<Result<Value, RpcError>>, total: usize) -> Result<Value, RpcError> {
    let mut tally: Vec<(Value, usize)> = Vec::new();
    let mut failures = Vec::new();
    for answer in answers {
        match answer {
            Ok(value) => match tally.iter_mut().find(|(v, _)| *v == value) {
                Some((_, count)) => *count += 1,
                None => tally.push((value, 1)),
            },
            Err(err) => failures.push(err.message),
        }
    }
    tally.sort_by(|a, b| b.1.cmp(&a.1));
    match tally.into_iter().next() {
        Some((value, count)) if count * 2 > total => Ok(value),
        best => Err(SdkError::Relay(format!(
            "no consensus among {total} relay nodes (best agreement {}, failures: [{}])",
            best.map_or(0, |(_, c)| c),
            failures.join("; ")
        ))
        .into()),
    }
}

#[async_trait]
impl RelayBackend for DecentralizedRelay {
    fn name(&self) -> &'static str {
        "decentralized"
    }

    async fn relay(
        &self,
        request: &JsonRpcRequest,
        ctx: &RequestContext,
    ) -> Result<Value, RpcError> {
        let netid = ctx.config.network.chain_id.as_deref().ok_or_else(|| {
            SdkError::Configuration("the decentralized relay needs a network with a chainId".to_owned())
        })?;
        let data = serde_json::to_string(request)
            .map_err(|e| SdkError::Validation(format!("unencodable request: {e}")))?;
        let nodes = self.pick_nodes();
        tracing::debug!(method = %request.method, netid, nodes = nodes.len(), "relaying");
        if let [node] = nodes.as_slice() {
            return self.relay_once(node, netid, &data).await;
        }
        let answers = join_all(nodes.iter().map(|node| self.relay_once(node, netid, &data))).await;
        majority(answers, nodes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_error_and_garbage_are_failures() {
        assert!(parse_relay_response(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).is_err());
        assert!(parse_relay_response("<html>bad gateway</html>").is_err());
        let err = parse_relay_response(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"header not found"}}"#,
        )
        .expect_err("error body");
        assert_eq!(err.code, -32000);
        assert_eq!(
            parse_relay_response(r#"{"jsonrpc":"2.0","id":1,"result":"0x1"}"#).expect("ok"),
            json!("0x1")
        );
    }

    #[test]
    fn majority_needs_more_than_half() {
        let ok = |v: &str| Ok(json!(v));
        assert_eq!(
            majority(vec![ok("0x1"), ok("0x1"), ok("0x2")], 3).expect("2 of 3"),
            json!("0x1")
        );
        assert!(majority(vec![ok("0x1"), ok("0x2")], 2).is_err());
        assert!(majority(
            vec![ok("0x1"), Err(RpcError::internal("down")), Err(RpcError::internal("down"))],
            3
        )
        .is_err());
    }
}
