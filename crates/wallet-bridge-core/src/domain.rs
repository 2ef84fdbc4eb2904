use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RpcError;

pub const JSONRPC_VERSION: &str = "2.0";

/// Id assigned to requests that arrive without one.
pub const DEFAULT_REQUEST_ID: u64 = 42;

fn default_jsonrpc() -> String {
    JSONRPC_VERSION.to_owned()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Number or string as the caller sent it. `null` stands for "missing";
    /// the default-id stage replaces it.
    #[serde(default)]
    pub id: Value,
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            id: id.into(),
            jsonrpc: JSONRPC_VERSION.to_owned(),
            method: method.into(),
            params,
        }
    }

    /// A request derived from this one (same id), used by stages that need
    /// to ask the rest of the chain something on the caller's behalf.
    pub fn derive(&self, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            id: self.id.clone(),
            jsonrpc: self.jsonrpc.clone(),
            method: method.into(),
            params,
        }
    }

    pub fn param(&self, index: usize) -> Option<&Value> {
        self.params.get(index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Value,
    pub jsonrpc: String,
    #[serde(default)]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl JsonRpcResponse {
    pub fn from_outcome(request: &JsonRpcRequest, outcome: Result<Value, RpcError>) -> Self {
        match outcome {
            Ok(result) => Self {
                id: request.id.clone(),
                jsonrpc: request.jsonrpc.clone(),
                result,
                error: None,
            },
            Err(error) => Self {
                id: request.id.clone(),
                jsonrpc: request.jsonrpc.clone(),
                result: Value::Null,
                error: Some(error),
            },
        }
    }

    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result),
        }
    }
}

/// Transport scheme of a node URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeProtocol {
    Http,
    #[default]
    Https,
    Ws,
    Wss,
}

impl NodeProtocol {
    pub fn from_url(url: &str) -> Option<Self> {
        let (scheme, _) = url.split_once("://")?;
        match scheme.to_ascii_lowercase().as_str() {
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            "ws" => Some(Self::Ws),
            "wss" => Some(Self::Wss),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDescriptor {
    pub node_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_relay_hub_address: Option<String>,
    #[serde(default)]
    pub protocol: NodeProtocol,
}

impl NetworkDescriptor {
    pub fn new(node_url: impl Into<String>, chain_id: Option<&str>) -> Self {
        let node_url = node_url.into();
        let protocol = NodeProtocol::from_url(&node_url).unwrap_or_default();
        Self {
            node_url,
            chain_id: chain_id.map(str::to_owned),
            gas_relay_hub_address: None,
            protocol,
        }
    }

    pub fn with_gas_relay_hub(mut self, hub: impl Into<String>) -> Self {
        self.gas_relay_hub_address = Some(hub.into());
        self
    }

    /// Key under which network-scoped state is kept: `"<nodeUrl>:<chainId>"`.
    pub fn network_key(&self) -> String {
        format!(
            "{}:{}",
            self.node_url,
            self.chain_id.as_deref().unwrap_or_default()
        )
    }
}

/// A network as the caller names it: a registry alias or an explicit
/// descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkInput {
    Alias(String),
    Descriptor(NetworkDescriptor),
}

impl From<&str> for NetworkInput {
    fn from(alias: &str) -> Self {
        Self::Alias(alias.to_owned())
    }
}

impl From<String> for NetworkInput {
    fn from(alias: String) -> Self {
        Self::Alias(alias)
    }
}

impl From<NetworkDescriptor> for NetworkInput {
    fn from(descriptor: NetworkDescriptor) -> Self {
        Self::Descriptor(descriptor)
    }
}

impl std::fmt::Display for NetworkInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alias(alias) => f.write_str(alias),
            Self::Descriptor(d) => f.write_str(&d.node_url),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageStandard {
    #[serde(rename = "signMessage")]
    Plain,
    #[serde(rename = "signPersonalMessage")]
    Personal,
    #[serde(rename = "signTypedMessage")]
    TypedV1,
    #[serde(rename = "signTypedMessageV3")]
    TypedV3,
}

impl MessageStandard {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "signMessage",
            Self::Personal => "signPersonalMessage",
            Self::TypedV1 => "signTypedMessage",
            Self::TypedV3 => "signTypedMessageV3",
        }
    }
}

/// Message signing request as the widget expects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageParams {
    pub from: String,
    pub data: Value,
    pub message_standard: MessageStandard,
}

/// The `{error, result}` envelope every remote widget method resolves to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetReply<T> {
    pub error: Option<Value>,
    pub result: Option<T>,
}

impl<T> WidgetReply<T> {
    pub fn ok(result: T) -> Self {
        Self {
            error: None,
            result: Some(result),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            error: Some(Value::String(message.into())),
            result: None,
        }
    }

    /// `null` and empty-string errors count as success, as they do on the
    /// widget side.
    pub fn is_error(&self) -> bool {
        match &self.error {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BtcSignTxRequest {
    pub coin: String,
    pub inputs: Vec<Value>,
    pub outputs: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locktime: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BtcSignedTx {
    pub serialized_tx: String,
    pub txid: String,
}
