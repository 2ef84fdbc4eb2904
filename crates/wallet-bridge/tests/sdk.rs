use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use wallet_bridge::{
    AdapterConfig, BtcSignTxRequest, DecentralizedParams, InMemoryHost, InMemoryWidget,
    JsonRpcRequest, LoginEvent, NetworkDescriptor, RelayChoice, SdkError, SdkOptions,
    VerifiedParams, WalletSdk, DEFAULT_BITCOIN_PATH, DEFAULT_XPUB_PATH,
};
use wallet_bridge_core::RemoteMethod;

const ALICE: &str = "0x1000000000000000000000000000000000000001";

fn sdk_with(
    network: impl Into<wallet_bridge::NetworkInput>,
    options: SdkOptions,
) -> Result<(WalletSdk, InMemoryHost), SdkError> {
    let widget = InMemoryWidget::with_accounts(&[ALICE]);
    widget.set_relay(|request: &JsonRpcRequest| match request.method.as_str() {
        "eth_chainId" => Ok(json!("0x1")),
        "eth_blockNumber" => Ok(json!("0x10")),
        other => Err(json!(format!("unsupported {other}"))),
    });
    let host = InMemoryHost::in_memory(widget);
    let sdk = WalletSdk::with_adapter_config(
        "dapp-1",
        network,
        options,
        Arc::new(host.clone()),
        &AdapterConfig::default(),
    )?;
    Ok((sdk, host))
}

#[test]
fn mainnet_alias_resolves_through_registry() {
    let (sdk, host) = sdk_with("mainnet", SdkOptions::default()).expect("construct");
    let config = sdk.config();
    assert_eq!(config.dapp_id, "dapp-1");
    assert_eq!(config.network.chain_id.as_deref(), Some("1"));
    assert!(config.network.node_url.starts_with("https://"));
    assert_eq!(config.network.gas_relay_hub_address, None);
    assert_eq!(sdk.backend_name(), "direct");
    assert_eq!(host.mounts(), 0, "the widget is mounted lazily");
}

#[test]
fn construction_rejects_bad_parameters() {
    let err = WalletSdk::with_adapter_config(
        " ",
        "mainnet",
        SdkOptions::default(),
        Arc::new(InMemoryHost::in_memory(InMemoryWidget::default())),
        &AdapterConfig::default(),
    )
    .expect_err("blank dapp id");
    assert!(matches!(err, SdkError::Configuration(_)));

    let err = sdk_with("atlantis", SdkOptions::default()).expect_err("unknown alias");
    assert!(matches!(err, SdkError::NetworkDescriptor(_)));

    let err = sdk_with(
        "goerli",
        SdkOptions {
            gas_relay: true,
            ..SdkOptions::default()
        },
    )
    .expect_err("goerli has no gas relay hub");
    assert!(matches!(err, SdkError::NetworkDescriptor(ref m) if m.contains("gas relay hub")));

    let err = sdk_with(
        NetworkDescriptor::new("ftp://node.example", None),
        SdkOptions::default(),
    )
    .expect_err("unsupported scheme");
    assert!(matches!(err, SdkError::NetworkDescriptor(_)));
}

#[test]
fn insecure_page_origin_is_rejected() {
    let host = InMemoryHost::in_memory(InMemoryWidget::default())
        .with_origin(Some("http://dapp.example"));
    let err = WalletSdk::with_adapter_config(
        "dapp-1",
        "mainnet",
        SdkOptions::default(),
        Arc::new(host),
        &AdapterConfig::default(),
    )
    .expect_err("http origin");
    assert!(matches!(err, SdkError::Configuration(ref m) if m.contains("secure origins")));

    let local = InMemoryHost::in_memory(InMemoryWidget::default())
        .with_origin(Some("http://localhost:3000"));
    WalletSdk::with_adapter_config(
        "dapp-1",
        "mainnet",
        SdkOptions::default(),
        Arc::new(local),
        &AdapterConfig::default(),
    )
    .expect("localhost is a secure context");
}

#[test]
fn bogus_scope_fails_before_construction() {
    let err = SdkOptions::from_json(&json!({"scope": ["bogus"]})).expect_err("bogus scope");
    assert!(matches!(err, SdkError::Configuration(ref m) if m.contains("scope")));
}

#[test]
fn relay_backend_options_are_validated() {
    let err = sdk_with(
        "mainnet",
        SdkOptions {
            relay: RelayChoice::Verified(VerifiedParams {
                chain: "ropsten".to_owned(),
                request_count: 1,
                min_deposit: 1,
            }),
            ..SdkOptions::default()
        },
    )
    .expect_err("ropsten is not a verified chain");
    assert!(matches!(err, SdkError::NetworkDescriptor(_)));

    let err = sdk_with(
        "mainnet",
        SdkOptions {
            relay: RelayChoice::Decentralized(DecentralizedParams {
                dev_id: String::new(),
                dispatchers: vec!["http://127.0.0.1:1".to_owned()],
                consensus_nodes: 1,
            }),
            ..SdkOptions::default()
        },
    )
    .expect_err("missing developer id");
    assert!(matches!(err, SdkError::Configuration(_)));

    let (sdk, _host) = sdk_with(
        "mainnet",
        SdkOptions {
            relay: RelayChoice::Verified(VerifiedParams {
                chain: "kovan".to_owned(),
                request_count: 1,
                min_deposit: 10,
            }),
            ..SdkOptions::default()
        },
    )
    .expect("verified kovan");
    assert_eq!(sdk.backend_name(), "verified");
    assert_eq!(sdk.config().network.chain_id.as_deref(), Some("42"));
}

#[tokio::test]
async fn login_event_and_accounts_flow_through_the_provider() {
    let (sdk, host) = sdk_with("mainnet", SdkOptions::default()).expect("construct");
    host.widget().set_email("alice@example.com");
    let seen: Arc<Mutex<Vec<LoginEvent>>> = Arc::default();
    let sink = Arc::clone(&seen);
    sdk.on_login(move |event| sink.lock().expect("lock").push(event.clone()));

    let provider = sdk.provider();
    let accounts = JsonRpcRequest::new(1, "eth_accounts", Vec::new());
    assert_eq!(provider.send_sync(&accounts).expect("sync").result, json!([]));

    assert_eq!(provider.enable().await.expect("enable"), vec![ALICE.to_owned()]);
    assert_eq!(provider.send_sync(&accounts).expect("sync").result, json!([ALICE]));
    assert_eq!(provider.selected_address().as_deref(), Some(ALICE));

    let events = seen.lock().expect("lock").clone();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].address, ALICE);
    assert_eq!(events[0].email.as_deref(), Some("alice@example.com"));
    assert_eq!(host.mounts(), 1);
}

#[tokio::test]
async fn widget_operations_use_default_paths() {
    let (sdk, host) = sdk_with("mainnet", SdkOptions::default()).expect("construct");

    let xpub = sdk
        .get_extended_public_key(None, None)
        .await
        .expect("xpub");
    assert!(xpub.starts_with("xpub-Ethereum-"));
    sdk.show_bitcoin_wallet(None).await.expect("show btc");
    sdk.show_widget().await.expect("show");

    let calls = host.widget().calls();
    let (_, xpub_args) = calls
        .iter()
        .find(|(m, _)| *m == RemoteMethod::GetExtendedPublicKey)
        .expect("xpub call");
    assert_eq!(xpub_args[0], json!(DEFAULT_XPUB_PATH));
    assert_eq!(xpub_args[1], json!("Ethereum"));
    assert_eq!(xpub_args[2]["dappId"], json!("dapp-1"));
    let (_, btc_args) = calls
        .iter()
        .find(|(m, _)| *m == RemoteMethod::ShowBitcoinWallet)
        .expect("btc call");
    assert_eq!(btc_args[0], json!(DEFAULT_BITCOIN_PATH));

    let signed = sdk
        .sign_bitcoin_transaction(&BtcSignTxRequest {
            coin: "Bitcoin".to_owned(),
            inputs: vec![json!({"txid": "aa", "vout": 0})],
            outputs: vec![json!({"address": "bc1q", "amount": "1000"})],
            version: None,
            locktime: None,
        })
        .await
        .expect("btc signed");
    assert!(signed.serialized_tx.starts_with("0x"));
    assert_ne!(signed.serialized_tx, signed.txid);
}

#[tokio::test]
async fn logout_clears_session_and_notifies() {
    let (sdk, host) = sdk_with("mainnet", SdkOptions::default()).expect("construct");
    let logged_out = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&logged_out);
    sdk.on_logout(move || *flag.lock().expect("lock") = true);

    sdk.provider().enable().await.expect("enable");
    assert!(sdk.is_logged_in().await.expect("logged in"));
    assert!(sdk.logout().await.expect("logout"));

    assert!(*logged_out.lock().expect("lock"));
    assert!(!sdk.is_logged_in().await.expect("logged out"));
    assert_eq!(sdk.provider().selected_address(), None);
    assert!(!host.widget().is_logged_in());
}

#[tokio::test]
async fn change_network_round_trip_keeps_caches() {
    let (sdk, host) = sdk_with("mainnet", SdkOptions::default()).expect("construct");
    let provider = sdk.provider();

    assert_eq!(provider.send("eth_chainId", Vec::new()).await.expect("chain"), json!("0x1"));
    let relayed = host.widget().calls_to(RemoteMethod::Relay);

    let kovan = sdk.change_network("kovan", false).expect("switch to kovan");
    assert_eq!(kovan.chain_id.as_deref(), Some("42"));
    assert_eq!(sdk.config().network, kovan);
    provider.send("eth_chainId", Vec::new()).await.expect("kovan chain");
    assert_eq!(host.widget().calls_to(RemoteMethod::Relay), relayed + 1);

    sdk.change_network("mainnet", false).expect("back to mainnet");
    assert_eq!(provider.send("eth_chainId", Vec::new()).await.expect("cached"), json!("0x1"));
    assert_eq!(
        host.widget().calls_to(RemoteMethod::Relay),
        relayed + 1,
        "mainnet answer came from its restored cache"
    );

    let err = sdk.change_network("atlantis", false).expect_err("unknown alias");
    assert!(matches!(err, SdkError::NetworkDescriptor(_)));
    assert_eq!(sdk.config().network.chain_id.as_deref(), Some("1"));
}

#[tokio::test]
async fn default_email_travels_with_the_next_call() {
    let (sdk, host) = sdk_with("mainnet", SdkOptions::default()).expect("construct");
    sdk.set_default_email("bob@example.com");
    sdk.show_widget().await.expect("show");
    let calls = host.widget().calls();
    let (_, args) = calls
        .iter()
        .find(|(m, _)| *m == RemoteMethod::ShowPortis)
        .expect("show call");
    assert_eq!(args.last().expect("config")["defaultEmail"], json!("bob@example.com"));
    assert_eq!(sdk.provider().send("eth_blockNumber", Vec::<Value>::new()).await.expect("block"), json!("0x10"));
}

#[test]
fn verified_relay_refuses_to_change_network() {
    let (sdk, _host) = sdk_with(
        "mainnet",
        SdkOptions {
            relay: RelayChoice::Verified(VerifiedParams {
                chain: "kovan".to_owned(),
                request_count: 1,
                min_deposit: 10,
            }),
            ..SdkOptions::default()
        },
    )
    .expect("verified kovan");

    let err = sdk.change_network("mainnet", false).expect_err("pinned to kovan");
    assert!(matches!(err, SdkError::Configuration(ref m) if m.contains("kovan")));
    assert_eq!(sdk.config().network.chain_id.as_deref(), Some("42"));
}

#[test]
fn decentralized_relay_switches_only_to_networks_with_a_chain_id() {
    let (sdk, _host) = sdk_with(
        "mainnet",
        SdkOptions {
            relay: RelayChoice::Decentralized(DecentralizedParams {
                dev_id: "dev-1".to_owned(),
                dispatchers: vec!["http://127.0.0.1:1".to_owned()],
                consensus_nodes: 1,
            }),
            ..SdkOptions::default()
        },
    )
    .expect("decentralized mainnet");

    let err = sdk
        .change_network(NetworkDescriptor::new("https://node.example", None), false)
        .expect_err("no chain id to relay to");
    assert!(matches!(err, SdkError::Configuration(_)));
    assert_eq!(sdk.config().network.chain_id.as_deref(), Some("1"));

    let kovan = sdk.change_network("kovan", false).expect("switch to kovan");
    assert_eq!(kovan.chain_id.as_deref(), Some("42"));
    assert_eq!(sdk.config().network, kovan);
}
