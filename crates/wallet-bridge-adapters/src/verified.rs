//! Relay that checks account state against the block's state root.
//!
//! Balance, nonce and code queries are answered only after the node's
//! answer has been matched against an `eth_getProof` account proof for the
//! same block. Pending state has no root: a `pending` transaction count is
//! accepted when it is at least the nonce proven at the latest block, and
//! pending balance and code are answered at the latest block. Everything
//! else is asked of `request_count` nodes, which must agree.

use std::sync::atomic::{AtomicU64, Ordering};

use alloy::primitives::{keccak256, Address, Bytes, B256, U256, U64};
use alloy_trie::KECCAK_EMPTY as KECCAK256_EMPTY;
use alloy_rlp::Encodable;
use alloy_trie::{proof::verify_proof, Nibbles, EMPTY_ROOT_HASH};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use wallet_bridge_core::error::CODE_RELAY;
use wallet_bridge_core::{
    JsonRpcRequest, NetworkDescriptor, RelayBackend, RequestContext, RpcError, SdkError,
    VerifiedParams,
};

use crate::AdapterConfig;

const PROVABLE: &[&str] = &["eth_getBalance", "eth_getTransactionCount", "eth_getCode"];

#[derive(Debug, Error)]
pub enum ProofError {
    #[error("node returned malformed {what}: {detail}")]
    Malformed { what: &'static str, detail: String },
    #[error("account proof for {address} does not match state root {root}")]
    InvalidProof { address: Address, root: B256 },
    #[error("{field} {claimed} disagrees with the proven {proven}")]
    Mismatch {
        field: &'static str,
        claimed: String,
        proven: String,
    },
    #[error("nodes disagree on {0}")]
    Disagreement(String),
}

impl From<ProofError> for RpcError {
    fn from(err: ProofError) -> Self {
        SdkError::Relay(err.to_string()).into()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountProof {
    account_proof: Vec<Bytes>,
    balance: U256,
    code_hash: B256,
    nonce: U64,
    storage_hash: B256,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeaderRoots {
    number: U64,
    state_root: B256,
}

impl AccountProof {
    fn is_empty_account(&self) -> bool {
        self.nonce.is_zero()
            && self.balance.is_zero()
            && self.code_hash == KECCAK256_EMPTY
            && self.storage_hash == EMPTY_ROOT_HASH
    }

    /// RLP of the account as stored in the state trie.
    fn trie_value(&self) -> Vec<u8> {
        let nonce: u64 = self.nonce.to();
        let balance = self.balance.to_be_bytes::<32>();
        let first = balance.iter().position(|b| *b != 0).unwrap_or(balance.len());
        let balance: &[u8] = &balance[first..];
        let storage: &[u8] = self.storage_hash.as_slice();
        let code: &[u8] = self.code_hash.as_slice();
        let fields: [&dyn Encodable; 4] = [&nonce, &balance, &storage, &code];
        let mut out = Vec::new();
        alloy_rlp::encode_list::<&dyn Encodable, dyn Encodable>(&fields, &mut out);
        out
    }

    fn verify(&self, address: Address, state_root: B256) -> Result<(), ProofError> {
        let expected = (!self.is_empty_account()).then(|| self.trie_value());
        verify_proof(
            state_root,
            Nibbles::unpack(keccak256(address)),
            expected,
            self.account_proof.iter(),
        )
        .map_err(|_| ProofError::InvalidProof {
            address,
            root: state_root,
        })
    }

    /// Checks the node's answer to `method` against the proven account.
    fn check(&self, method: &str, claimed: &Value) -> Result<(), ProofError> {
        let malformed = |detail: String| ProofError::Malformed {
            what: "result",
            detail,
        };
        match method {
            "eth_getBalance" => {
                let balance: U256 = serde_json::from_value(claimed.clone())
                    .map_err(|e| malformed(e.to_string()))?;
                if balance != self.balance {
                    return Err(ProofError::Mismatch {
                        field: "balance",
                        claimed: balance.to_string(),
                        proven: self.balance.to_string(),
                    });
                }
            }
            "eth_getTransactionCount" => {
                let nonce: U64 = serde_json::from_value(claimed.clone())
                    .map_err(|e| malformed(e.to_string()))?;
                if nonce != self.nonce {
                    return Err(ProofError::Mismatch {
                        field: "nonce",
                        claimed: nonce.to_string(),
                        proven: self.nonce.to_string(),
                    });
                }
            }
            "eth_getCode" => {
                let code: Bytes = serde_json::from_value(claimed.clone())
                    .map_err(|e| malformed(e.to_string()))?;
                let hash = keccak256(&code);
                if hash != self.code_hash {
                    return Err(ProofError::Mismatch {
                        field: "code hash",
                        claimed: hash.to_string(),
                        proven: self.code_hash.to_string(),
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// A pending count includes mempool transactions, so it can only be
    /// bounded from below by the proven nonce.
    fn check_pending_nonce(&self, claimed: &Value) -> Result<(), ProofError> {
        let nonce: U64 = serde_json::from_value(claimed.clone()).map_err(|e| ProofError::Malformed {
            what: "result",
            detail: e.to_string(),
        })?;
        if nonce < self.nonce {
            return Err(ProofError::Mismatch {
                field: "pending nonce",
                claimed: nonce.to_string(),
                proven: self.nonce.to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct VerifiedRelay {
    client: reqwest::Client,
    nodes: Vec<String>,
    request_count: usize,
    next_id: AtomicU64,
}

impl VerifiedRelay {
    /// `descriptor` is the network resolved for the verified chain; its node
    /// comes first, followed by the configured extra nodes.
    pub fn new(
        params: &VerifiedParams,
        descriptor: &NetworkDescriptor,
        config: &AdapterConfig,
    ) -> Result<Self, SdkError> {
        let mut nodes = vec![descriptor.node_url.clone()];
        nodes.extend(config.verified_nodes.iter().cloned());
        nodes.dedup();

        let requested = usize::try_from(params.request_count).unwrap_or(usize::MAX);
        let request_count = requested.clamp(1, nodes.len());
        if request_count < requested {
            tracing::warn!(
                requested,
                available = nodes.len(),
                "fewer verified nodes than requestCount; asking all of them"
            );
        }
        let client = reqwest::Client::builder()
            .timeout(config.relay_timeout())
            .build()
            .map_err(|e| SdkError::Configuration(format!("failed to build http client: {e}")))?;
        tracing::info!(
            chain = %params.chain,
            nodes = nodes.len(),
            request_count,
            min_deposit = %params.min_deposit,
            "verified relay ready; node deposits are not checked"
        );

        Ok(Self {
            client,
            nodes,
            request_count,
            next_id: AtomicU64::new(1),
        })
    }

    fn asked_nodes(&self) -> &[String] {
        &self.nodes[..self.request_count]
    }

    async fn node_call(&self, node: &str, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(node)
            .json(&body)
            .send()
            .await
            .map_err(|e| SdkError::Relay(format!("node {node} unreachable: {e}")))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| SdkError::Relay(format!("node {node} json decode failed: {e}")))?;
        if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
            return Err(RpcError::from_remote(error, CODE_RELAY));
        }
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Asks every node and requires identical answers.
    async fn agreed_call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let answers = join_all(
            self.asked_nodes()
                .iter()
                .map(|node| self.node_call(node, method, params.clone())),
        )
        .await;
        let mut agreed: Option<Value> = None;
        for answer in answers {
            let answer = answer?;
            match &agreed {
                None => agreed = Some(answer),
                Some(first) if *first == answer => {}
                Some(_) => return Err(ProofError::Disagreement(method.to_owned()).into()),
            }
        }
        Ok(agreed.unwrap_or(Value::Null))
    }

    async fn proven_account_query(&self, request: &JsonRpcRequest) -> Result<Value, RpcError> {
        let address: Address = request
            .param(0)
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| RpcError::invalid_params(format!("{} expects an address", request.method)))?;
        let tag = request
            .param(1)
            .cloned()
            .unwrap_or_else(|| Value::from("latest"));
        let pending = tag.as_str() == Some("pending");
        let header_tag = if pending {
            Value::from("latest")
        } else {
            tag.clone()
        };

        let header = self
            .agreed_call("eth_getBlockByNumber", vec![header_tag, Value::Bool(false)])
            .await?;
        let header: HeaderRoots = serde_json::from_value(header).map_err(|e| ProofError::Malformed {
            what: "block header",
            detail: e.to_string(),
        })?;
        let block = json!(header.number);
        let address_param = json!(address);

        let proof = self
            .node_call(
                &self.nodes[0],
                "eth_getProof",
                vec![address_param.clone(), json!([]), block.clone()],
            )
            .await?;
        let proof: AccountProof = serde_json::from_value(proof).map_err(|e| ProofError::Malformed {
            what: "account proof",
            detail: e.to_string(),
        })?;
        proof.verify(address, header.state_root)?;

        if pending && request.method == "eth_getTransactionCount" {
            let claimed = self
                .agreed_call(&request.method, vec![address_param, tag])
                .await?;
            proof.check_pending_nonce(&claimed)?;
            tracing::debug!(%address, block = %header.number, "pending nonce bounded by proof");
            return Ok(claimed);
        }

        let claimed = self
            .agreed_call(&request.method, vec![address_param, block])
            .await?;
        proof.check(&request.method, &claimed)?;
        tracing::debug!(method = %request.method, %address, block = %header.number, "verified account state");
        Ok(claimed)
    }
}

#[async_trait]
impl RelayBackend for VerifiedRelay {
    fn name(&self) -> &'static str {
        "verified"
    }

    async fn relay(
        &self,
        request: &JsonRpcRequest,
        _ctx: &RequestContext,
    ) -> Result<Value, RpcError> {
        if PROVABLE.contains(&request.method.as_str()) {
            return self.proven_account_query(request).await;
        }
        self.agreed_call(&request.method, request.params.clone())
            .await
    }
}
