use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::RequestContext;
use crate::domain::JsonRpcRequest;
use crate::pipeline::{Next, Stage, StageResult};

/// Answers a fixed set of methods with constant results.
#[derive(Debug, Clone)]
pub struct FixtureStage {
    answers: BTreeMap<String, Value>,
}

impl FixtureStage {
    pub fn new(answers: BTreeMap<String, Value>) -> Self {
        Self { answers }
    }

    /// The node-status answers a wallet-backed provider gives without asking
    /// any node.
    pub fn standard(version: &str) -> Self {
        let answers = [
            (
                "web3_clientVersion",
                json!(format!("WalletBridge/v{version}/rust")),
            ),
            ("net_listening", json!(true)),
            ("eth_hashrate", json!("0x00")),
            ("eth_mining", json!(false)),
            ("eth_syncing", json!(true)),
        ]
        .into_iter()
        .map(|(method, value)| (method.to_owned(), value))
        .collect();
        Self::new(answers)
    }
}

#[async_trait]
impl Stage for FixtureStage {
    async fn handle(
        &self,
        request: JsonRpcRequest,
        _ctx: &RequestContext,
        next: Next<'_>,
    ) -> StageResult {
        match self.answers.get(&request.method) {
            Some(answer) => Ok(answer.clone()),
            None => next.run(request).await,
        }
    }
}
