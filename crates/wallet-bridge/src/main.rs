//! wallet-bridge-probe: sends one JSON-RPC request through the SDK pipeline
//! and prints the response.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use eyre::WrapErr;
use serde_json::Value;

use wallet_bridge::{
    AdapterConfig, DecentralizedParams, HeadlessWidgetHost, InMemoryHost, InMemoryWidget,
    JsonRpcRequest, NetworkDescriptor, NetworkInput, RelayChoice, SdkOptions, VerifiedParams,
    WalletSdk, WidgetHost,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Relay {
    Direct,
    Decentralized,
    Verified,
}

#[derive(Debug, Parser)]
#[command(
    name = "wallet-bridge-probe",
    about = "Send one JSON-RPC request through the wallet bridge pipeline"
)]
struct Args {
    #[arg(long, env = "WALLET_BRIDGE_DAPP_ID")]
    dapp_id: String,

    /// Registry alias of the network.
    #[arg(long, default_value = "mainnet")]
    network: String,

    /// Explicit node URL; takes precedence over --network.
    #[arg(long)]
    node_url: Option<String>,

    #[arg(long, requires = "node_url")]
    chain_id: Option<String>,

    #[arg(long, value_enum, default_value_t = Relay::Direct)]
    relay: Relay,

    /// Developer id for the decentralized relay.
    #[arg(long)]
    dev_id: Option<String>,

    #[arg(long, default_value_t = 1)]
    consensus_nodes: usize,

    /// Chain alias for the verified relay.
    #[arg(long, default_value = "mainnet")]
    verified_chain: String,

    #[arg(long, default_value_t = 1)]
    request_count: u32,

    #[arg(long, default_value_t = 10_000_000_000_000_000)]
    min_deposit: u128,

    #[arg(long)]
    staging: bool,

    /// Serve the wallet from memory with this account instead of talking to
    /// a widget service.
    #[arg(long)]
    in_memory_account: Option<String>,

    method: String,

    /// JSON array of parameters.
    #[arg(default_value = "[]")]
    params: String,
}

impl Args {
    fn network_input(&self) -> NetworkInput {
        match &self.node_url {
            Some(url) => NetworkDescriptor::new(url.as_str(), self.chain_id.as_deref()).into(),
            None => NetworkInput::Alias(self.network.clone()),
        }
    }

    fn options(&self) -> eyre::Result<SdkOptions> {
        let relay = match self.relay {
            Relay::Direct => RelayChoice::Direct,
            Relay::Decentralized => RelayChoice::Decentralized(DecentralizedParams {
                dev_id: self
                    .dev_id
                    .clone()
                    .ok_or_else(|| eyre::eyre!("--dev-id is required for the decentralized relay"))?,
                dispatchers: Vec::new(),
                consensus_nodes: self.consensus_nodes,
            }),
            Relay::Verified => RelayChoice::Verified(VerifiedParams {
                chain: self.verified_chain.clone(),
                request_count: self.request_count,
                min_deposit: self.min_deposit,
            }),
        };
        Ok(SdkOptions {
            staging: self.staging,
            relay,
            ..SdkOptions::default()
        })
    }

    fn host(&self, adapters: &AdapterConfig) -> eyre::Result<Arc<dyn WidgetHost>> {
        if let Some(account) = &self.in_memory_account {
            let widget = InMemoryWidget::with_accounts(&[account.as_str()]);
            return Ok(Arc::new(InMemoryHost::in_memory(widget)));
        }
        let timeout = Duration::from_millis(adapters.bridge_connect_timeout_ms.max(1));
        Ok(Arc::new(HeadlessWidgetHost::new(timeout)?))
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let params: Vec<Value> =
        serde_json::from_str(&args.params).wrap_err("params must be a JSON array")?;

    let adapters = AdapterConfig::from_env();
    let sdk = WalletSdk::with_adapter_config(
        &args.dapp_id,
        args.network_input(),
        args.options()?,
        args.host(&adapters)?,
        &adapters,
    )?;
    tracing::info!(?sdk, method = %args.method, "probing");

    let response = sdk
        .provider()
        .send_async(JsonRpcRequest::new(1, args.method.as_str(), params))
        .await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    if let Some(error) = response.error {
        eyre::bail!("request failed: {error}");
    }
    Ok(())
}
