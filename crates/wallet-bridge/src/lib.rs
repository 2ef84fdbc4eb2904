//! Wallet bridge SDK: an Ethereum JSON-RPC provider whose accounts and
//! signatures live in an embedded wallet widget.
//!
//! [`WalletSdk`] validates the dapp's options, picks the relay backend,
//! assembles the request pipeline and exposes the widget operations. The
//! JSON-RPC surface itself is [`WalletSdk::provider`].

use std::sync::Arc;

use serde_json::Value;

pub use wallet_bridge_adapters::{
    AdapterConfig, DecentralizedRelay, HeadlessWidgetHost, InMemoryHost, InMemoryWidget,
    VerifiedRelay,
};
pub use wallet_bridge_core::{
    BtcSignTxRequest, BtcSignedTx, DecentralizedParams, JsonRpcRequest, JsonRpcResponse,
    LegacyProvider, LoginEvent, NetworkDescriptor, NetworkInput, RelayChoice, RpcError, Scope,
    SdkConfig, SdkError, SdkOptions, VerifiedParams, WidgetHost,
};

use wallet_bridge_core::stages::{standard_pipeline, DirectRelay};
use wallet_bridge_core::{
    resolve_network, validate_params, validate_secure_origin, Bridge, Pipeline, RelayBackend,
    SdkContext, WidgetReply,
};

pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_XPUB_PATH: &str = "m/44'/60'/0'/0/0";
pub const DEFAULT_XPUB_COIN: &str = "Ethereum";
pub const DEFAULT_BITCOIN_PATH: &str = "m/49'/0'/0'/0/0";

fn describe(error: &Value) -> String {
    error
        .as_str()
        .map(str::to_owned)
        .or_else(|| error.get("message").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| error.to_string())
}

/// The widget's `{error, result}` envelope as a `Result`.
fn settle<T>(operation: &str, reply: WidgetReply<T>) -> Result<Option<T>, SdkError> {
    if reply.is_error() {
        let error = reply.error.unwrap_or(Value::Null);
        return Err(SdkError::Bridge(format!("{operation} failed: {}", describe(&error))));
    }
    Ok(reply.result)
}

fn relay_chain_id(descriptor: &NetworkDescriptor) -> Result<&str, SdkError> {
    descriptor.chain_id.as_deref().ok_or_else(|| {
        SdkError::Configuration("the decentralized relay needs a network with a chainId".to_owned())
    })
}

fn require<T>(operation: &str, reply: WidgetReply<T>) -> Result<T, SdkError> {
    settle(operation, reply)?
        .ok_or_else(|| SdkError::Bridge(format!("{operation} returned no result")))
}

pub struct WalletSdk {
    context: Arc<SdkContext>,
    bridge: Arc<Bridge>,
    provider: LegacyProvider,
    options: SdkOptions,
    backend: &'static str,
}

impl std::fmt::Debug for WalletSdk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSdk")
            .field("instance", &self.bridge.instance_id())
            .field("network", &self.context.config().network.node_url)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl WalletSdk {
    /// Builds an SDK instance with adapter settings taken from the
    /// environment.
    pub fn new(
        dapp_id: &str,
        network: impl Into<NetworkInput>,
        options: SdkOptions,
        host: Arc<dyn WidgetHost>,
    ) -> Result<Self, SdkError> {
        Self::with_adapter_config(dapp_id, network, options, host, &AdapterConfig::from_env())
    }

    /// Validation happens before anything touches the widget or a node:
    /// parameters, network, relay options, then the page origin. The widget
    /// itself is mounted lazily by the first call that needs it.
    pub fn with_adapter_config(
        dapp_id: &str,
        network: impl Into<NetworkInput>,
        options: SdkOptions,
        host: Arc<dyn WidgetHost>,
        adapters: &AdapterConfig,
    ) -> Result<Self, SdkError> {
        let network = network.into();
        validate_params(dapp_id, &network)?;

        let verified = match &options.relay {
            RelayChoice::Verified(params) => Some(params),
            _ => None,
        };
        let descriptor = resolve_network(&network, options.gas_relay, verified)?;

        let remote: Option<Arc<dyn RelayBackend>> = match &options.relay {
            RelayChoice::Direct => None,
            RelayChoice::Decentralized(params) => {
                relay_chain_id(&descriptor)?;
                Some(Arc::new(DecentralizedRelay::new(params, adapters)?))
            }
            RelayChoice::Verified(params) => {
                Some(Arc::new(VerifiedRelay::new(params, &descriptor, adapters)?))
            }
        };

        if let Some(origin) = host.origin() {
            validate_secure_origin(&origin)?;
        }

        let config = SdkConfig {
            dapp_id: dapp_id.to_owned(),
            network: descriptor.clone(),
            version: SDK_VERSION.to_owned(),
            scope: options.scope.clone(),
            default_email: None,
            register_page_by_default: options.register_page_by_default,
            staging: options.staging,
        };
        let context = SdkContext::new(config.clone());
        let bridge = Arc::new(Bridge::new(
            host,
            Arc::clone(context.session()),
            adapters.bridge_settings(&config),
        ));

        let backend: Arc<dyn RelayBackend> = match remote {
            Some(backend) => backend,
            None => Arc::new(DirectRelay::new(Arc::clone(&bridge))),
        };
        let backend_name = backend.name();

        let pipeline = Arc::new(standard_pipeline(
            Arc::clone(&context),
            Arc::clone(&bridge),
            backend,
        ));
        tracing::info!(
            instance = bridge.instance_id(),
            network = %descriptor.network_key(),
            backend = backend_name,
            "wallet SDK ready"
        );

        Ok(Self {
            context,
            bridge,
            provider: LegacyProvider::new(pipeline),
            options,
            backend: backend_name,
        })
    }

    pub fn provider(&self) -> &LegacyProvider {
        &self.provider
    }

    pub fn config(&self) -> Arc<SdkConfig> {
        self.context.config()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend
    }

    pub fn instance_id(&self) -> u64 {
        self.bridge.instance_id()
    }

    /// Switches to another network. The decentralized relay follows the
    /// switch and needs a `chainId` on the target. The verified relay is
    /// pinned to its verified chain, so switching is refused; nothing
    /// changes on a refused switch.
    pub fn change_network(
        &self,
        network: impl Into<NetworkInput>,
        gas_relay: bool,
    ) -> Result<NetworkDescriptor, SdkError> {
        let network = network.into();
        match &self.options.relay {
            RelayChoice::Direct => {}
            RelayChoice::Decentralized(_) => {
                relay_chain_id(&resolve_network(&network, gas_relay, None)?)?;
            }
            RelayChoice::Verified(params) => {
                return Err(SdkError::Configuration(format!(
                    "the verified relay is pinned to {}; create a new instance for another network",
                    params.chain
                )));
            }
        }
        self.context.switch_network(&network, gas_relay)
    }

    pub fn set_default_email(&self, email: impl Into<String>) {
        self.context.set_default_email(email);
    }

    pub fn on_login(&self, handler: impl Fn(&LoginEvent) + Send + Sync + 'static) {
        self.bridge.handlers().set_on_login(handler);
    }

    pub fn on_logout(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.bridge.handlers().set_on_logout(handler);
    }

    pub fn on_active_wallet_changed(&self, handler: impl Fn(&str) + Send + Sync + 'static) {
        self.bridge.handlers().set_on_active_wallet_changed(handler);
    }

    pub fn on_error(&self, handler: impl Fn(&Value) + Send + Sync + 'static) {
        self.bridge.handlers().set_on_error(handler);
    }

    pub async fn show_widget(&self) -> Result<(), SdkError> {
        let reply = self.bridge.show_portis(&self.config()).await?;
        settle("showPortis", reply).map(|_| ())
    }

    pub async fn logout(&self) -> Result<bool, SdkError> {
        let reply = self.bridge.logout(&self.config()).await?;
        Ok(settle("logout", reply)?.unwrap_or(false))
    }

    pub async fn is_logged_in(&self) -> Result<bool, SdkError> {
        let reply = self.bridge.is_logged_in(&self.config()).await?;
        Ok(settle("isLoggedIn", reply)?.unwrap_or(false))
    }

    pub async fn get_extended_public_key(
        &self,
        path: Option<&str>,
        coin: Option<&str>,
    ) -> Result<String, SdkError> {
        let reply = self
            .bridge
            .get_extended_public_key(
                path.unwrap_or(DEFAULT_XPUB_PATH),
                coin.unwrap_or(DEFAULT_XPUB_COIN),
                &self.config(),
            )
            .await?;
        require("getExtendedPublicKey", reply)
    }

    pub async fn import_wallet(&self, mnemonic_or_private_key: &str) -> Result<Value, SdkError> {
        let reply = self
            .bridge
            .import_wallet(mnemonic_or_private_key, &self.config())
            .await?;
        Ok(settle("importWallet", reply)?.unwrap_or(Value::Null))
    }

    pub async fn sign_bitcoin_transaction(
        &self,
        request: &BtcSignTxRequest,
    ) -> Result<BtcSignedTx, SdkError> {
        let reply = self
            .bridge
            .sign_bitcoin_transaction(request, &self.config())
            .await?;
        require("signBitcoinTransaction", reply)
    }

    pub async fn show_bitcoin_wallet(&self, path: Option<&str>) -> Result<(), SdkError> {
        let reply = self
            .bridge
            .show_bitcoin_wallet(path.unwrap_or(DEFAULT_BITCOIN_PATH), &self.config())
            .await?;
        settle("showBitcoinWallet", reply).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_prefers_message_text() {
        assert_eq!(describe(&Value::from("User denied")), "User denied");
        assert_eq!(
            describe(&serde_json::json!({"code": 4001, "message": "rejected"})),
            "rejected"
        );
        assert_eq!(describe(&serde_json::json!(7)), "7");
    }

    #[test]
    fn empty_error_string_is_success() {
        let reply = WidgetReply {
            error: Some(Value::from("")),
            result: Some(true),
        };
        assert_eq!(settle("isLoggedIn", reply).expect("ok"), Some(true));
        let missing: WidgetReply<String> = WidgetReply {
            error: None,
            result: None,
        };
        assert!(matches!(
            require("getExtendedPublicKey", missing),
            Err(SdkError::Bridge(_))
        ));
    }
}
