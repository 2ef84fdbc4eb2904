#![allow(dead_code)]

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread;

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::Encodable;
use serde_json::{json, Value};
use tiny_http::{Response, Server, StatusCode};

use wallet_bridge_adapters::{AdapterConfig, InMemoryHost, InMemoryWidget};
use wallet_bridge_core::stages::standard_pipeline;
use wallet_bridge_core::{
    Bridge, BridgeSettings, NetworkDescriptor, Pipeline, RelayBackend, SdkConfig, SdkContext,
};

pub const ALICE: &str = "0x1000000000000000000000000000000000000001";
pub const BOB: &str = "0x2000000000000000000000000000000000000002";

pub fn sample_config(node_url: &str) -> SdkConfig {
    SdkConfig {
        dapp_id: "dapp-test".to_owned(),
        network: NetworkDescriptor::new(node_url, Some("1337")),
        version: "test".to_owned(),
        scope: Vec::new(),
        default_email: None,
        register_page_by_default: None,
        staging: false,
    }
}

pub struct Harness {
    pub context: Arc<SdkContext>,
    pub bridge: Arc<Bridge>,
    pub pipeline: Arc<Pipeline>,
    pub host: InMemoryHost,
}

/// Pipeline over an in-memory widget. `backend` defaults to relaying
/// through the widget.
pub fn harness(
    host: InMemoryHost,
    settings: BridgeSettings,
    backend: Option<Arc<dyn RelayBackend>>,
) -> Harness {
    let context = SdkContext::new(sample_config("http://localhost:8545"));
    let bridge = Arc::new(Bridge::new(
        Arc::new(host.clone()),
        Arc::clone(context.session()),
        settings,
    ));
    let backend = backend.unwrap_or_else(|| {
        Arc::new(wallet_bridge_core::stages::DirectRelay::new(Arc::clone(&bridge)))
    });
    let pipeline = Arc::new(standard_pipeline(
        Arc::clone(&context),
        Arc::clone(&bridge),
        backend,
    ));
    Harness {
        context,
        bridge,
        pipeline,
        host,
    }
}

pub fn alice_host() -> InMemoryHost {
    InMemoryHost::in_memory(InMemoryWidget::with_accounts(&[ALICE, BOB]))
}

pub fn adapter_config() -> AdapterConfig {
    AdapterConfig {
        relay_timeout_ms: 5_000,
        ..AdapterConfig::default()
    }
}

/// A local HTTP endpoint answering every POST through `handler`, which gets
/// the path and the parsed body and returns status and raw response text.
pub struct MockServer {
    pub url: String,
    requests: Arc<Mutex<Vec<(String, Value)>>>,
}

impl MockServer {
    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().expect("requests").clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(|(_, body)| body.get("method").and_then(Value::as_str).map(str::to_owned))
            .collect()
    }
}

pub fn spawn_mock_server(
    handler: impl Fn(&str, &Value) -> (u16, String) + Send + 'static,
) -> MockServer {
    let server = Server::http("127.0.0.1:0").expect("start server");
    let url = format!("http://{}", server.server_addr());
    let requests = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&requests);

    thread::spawn(move || {
        for _ in 0..256 {
            let mut req = match server.recv() {
                Ok(r) => r,
                Err(_) => break,
            };
            let path = req.url().to_owned();
            let mut raw = String::new();
            let _ = req.as_reader().read_to_string(&mut raw);
            let body: Value = serde_json::from_str(&raw).unwrap_or(Value::Null);
            if let Ok(mut g) = log.lock() {
                g.push((path.clone(), body.clone()));
            }

            let (code, payload) = handler(&path, &body);
            let response = Response::from_string(payload).with_status_code(StatusCode(code));
            let _ = req.respond(response);
        }
    });

    MockServer { url, requests }
}

/// A JSON-RPC node: `answer` maps method and params to a result.
pub fn spawn_node(answer: impl Fn(&str, &[Value]) -> Value + Send + 'static) -> MockServer {
    spawn_mock_server(move |_, body| {
        let method = body.get("method").and_then(Value::as_str).unwrap_or_default();
        let params = body
            .get("params")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let id = body.get("id").cloned().unwrap_or(Value::Null);
        let reply = json!({"jsonrpc": "2.0", "id": id, "result": answer(method, &params)});
        (200, reply.to_string())
    })
}

/// Account fields as `eth_getProof` reports them.
#[derive(Debug, Clone)]
pub struct ProvenAccount {
    pub address: Address,
    pub nonce: u64,
    pub balance: U256,
    pub code: Bytes,
    pub storage_hash: B256,
}

impl ProvenAccount {
    pub fn code_hash(&self) -> B256 {
        keccak256(&self.code)
    }

    fn trie_value(&self) -> Vec<u8> {
        let balance = self.balance.to_be_bytes::<32>();
        let first = balance.iter().position(|b| *b != 0).unwrap_or(32);
        let balance: &[u8] = &balance[first..];
        let storage: &[u8] = self.storage_hash.as_slice();
        let code_hash = self.code_hash();
        let code: &[u8] = code_hash.as_slice();
        let fields: [&dyn Encodable; 4] = [&self.nonce, &balance, &storage, &code];
        let mut out = Vec::new();
        alloy_rlp::encode_list::<&dyn Encodable, dyn Encodable>(&fields, &mut out);
        out
    }

    /// State trie holding only this account: a single leaf node, which is
    /// also the whole proof. Returns the state root and the leaf.
    pub fn single_leaf_state(&self) -> (B256, Bytes) {
        let mut path = vec![0x20];
        path.extend_from_slice(keccak256(self.address).as_slice());
        let path: &[u8] = &path;
        let value = self.trie_value();
        let value: &[u8] = &value;
        let fields: [&dyn Encodable; 2] = [&path, &value];
        let mut leaf = Vec::new();
        alloy_rlp::encode_list::<&dyn Encodable, dyn Encodable>(&fields, &mut leaf);
        (keccak256(&leaf), Bytes::from(leaf))
    }

    pub fn proof_json(&self, leaf: &Bytes) -> Value {
        json!({
            "address": self.address,
            "accountProof": [leaf],
            "balance": self.balance,
            "codeHash": self.code_hash(),
            "nonce": format!("0x{:x}", self.nonce),
            "storageHash": self.storage_hash,
            "storageProof": [],
        })
    }
}
