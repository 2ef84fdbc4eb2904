use serde_json::json;
use wallet_bridge_core::{
    JsonRpcRequest, JsonRpcResponse, NetworkDescriptor, NodeProtocol, RemoteMethod, RpcError,
    Scope, SdkConfig, WidgetReply,
};

#[test]
fn sdk_config_serializes_with_widget_field_names() {
    let config = SdkConfig {
        dapp_id: "dapp".to_owned(),
        network: NetworkDescriptor::new("https://node.example", Some("1"))
            .with_gas_relay_hub("0x01"),
        version: "1.0.0".to_owned(),
        scope: vec![Scope::Email],
        default_email: Some("a@b.c".to_owned()),
        register_page_by_default: Some(true),
        staging: false,
    };
    let value = serde_json::to_value(&config).expect("serialize config");
    assert_eq!(value["dappId"], "dapp");
    assert_eq!(value["network"]["nodeUrl"], "https://node.example");
    assert_eq!(value["network"]["chainId"], "1");
    assert_eq!(value["network"]["gasRelayHubAddress"], "0x01");
    assert_eq!(value["network"]["protocol"], "https");
    assert_eq!(value["scope"], json!(["email"]));
    assert_eq!(value["defaultEmail"], "a@b.c");
    assert_eq!(value["registerPageByDefault"], true);

    let back: SdkConfig = serde_json::from_value(value).expect("deserialize config");
    assert_eq!(back, config);
}

#[test]
fn descriptor_without_optional_fields() {
    let d: NetworkDescriptor =
        serde_json::from_value(json!({"nodeUrl": "wss://node.example/ws"})).expect("descriptor");
    assert_eq!(d.chain_id, None);
    assert_eq!(d.gas_relay_hub_address, None);
    let encoded = serde_json::to_value(&d).expect("encode");
    assert!(encoded.get("chainId").is_none());
    assert_eq!(NodeProtocol::from_url(&d.node_url), Some(NodeProtocol::Wss));
}

#[test]
fn error_response_has_null_result() {
    let req = JsonRpcRequest::new(5, "eth_call", vec![]);
    let resp = JsonRpcResponse::from_outcome(&req, Err(RpcError::internal("boom")));
    let value = serde_json::to_value(&resp).expect("encode response");
    assert_eq!(value["id"], 5);
    assert_eq!(value["result"], serde_json::Value::Null);
    assert_eq!(value["error"]["message"], "boom");
    assert!(resp.into_result().is_err());
}

#[test]
fn widget_reply_shapes() {
    let ok: WidgetReply<Vec<String>> =
        serde_json::from_value(json!({"error": null, "result": ["0x1"]})).expect("ok reply");
    assert!(!ok.is_error());
    assert_eq!(ok.result, Some(vec!["0x1".to_owned()]));

    let err: WidgetReply<Vec<String>> =
        serde_json::from_value(json!({"error": {"message": "denied"}})).expect("err reply");
    assert!(err.is_error());
    assert_eq!(err.result, None);
}

#[test]
fn remote_method_names_round_trip() {
    for method in RemoteMethod::ALL {
        assert_eq!(RemoteMethod::from_name(method.name()), Some(method));
    }
    assert_eq!(RemoteMethod::from_name("purchaseERC20"), None);
}
