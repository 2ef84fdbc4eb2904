use std::time::Duration;

use wallet_bridge_core::{BridgeSettings, SdkConfig};

pub const WIDGET_URL_ENV: &str = "WALLET_BRIDGE_WIDGET_URL";
pub const CALL_TIMEOUT_ENV: &str = "WALLET_BRIDGE_CALL_TIMEOUT_MS";
pub const CONNECT_TIMEOUT_ENV: &str = "WALLET_BRIDGE_CONNECT_TIMEOUT_MS";
pub const RELAY_TIMEOUT_ENV: &str = "WALLET_BRIDGE_RELAY_TIMEOUT_MS";
pub const DISPATCHERS_ENV: &str = "WALLET_BRIDGE_DISPATCHERS";
pub const VERIFIED_NODES_ENV: &str = "WALLET_BRIDGE_VERIFIED_NODES";

/// Runtime knobs of the adapters. Everything here is optional tuning; the
/// dapp-facing configuration lives in [`SdkConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Overrides the production widget URL. Ignored in staging.
    pub widget_url: Option<String>,
    /// `0` disables the bound.
    pub bridge_call_timeout_ms: u64,
    pub bridge_connect_timeout_ms: u64,
    pub relay_timeout_ms: u64,
    /// Used when the decentralized relay options name no dispatcher.
    pub default_dispatchers: Vec<String>,
    /// Extra nodes the verified relay may cross-check against.
    pub verified_nodes: Vec<String>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            widget_url: None,
            bridge_call_timeout_ms: 0,
            bridge_connect_timeout_ms: 30_000,
            relay_timeout_ms: 15_000,
            default_dispatchers: vec!["https://dispatch-1.nodes.pokt.network:4201".to_owned()],
            verified_nodes: Vec::new(),
        }
    }
}

impl AdapterConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source. Unparseable
    /// values are logged and replaced by the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |key: &str, fallback: u64| match lookup(key) {
            None => fallback,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(key, raw = %raw, "ignoring non-numeric timeout");
                fallback
            }),
        };
        let list = |key: &str| {
            lookup(key).map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect::<Vec<_>>()
            })
        };

        Self {
            widget_url: lookup(WIDGET_URL_ENV).filter(|url| !url.trim().is_empty()),
            bridge_call_timeout_ms: millis(CALL_TIMEOUT_ENV, defaults.bridge_call_timeout_ms),
            bridge_connect_timeout_ms: millis(
                CONNECT_TIMEOUT_ENV,
                defaults.bridge_connect_timeout_ms,
            ),
            relay_timeout_ms: millis(RELAY_TIMEOUT_ENV, defaults.relay_timeout_ms),
            default_dispatchers: list(DISPATCHERS_ENV).unwrap_or(defaults.default_dispatchers),
            verified_nodes: list(VERIFIED_NODES_ENV).unwrap_or(defaults.verified_nodes),
        }
    }

    pub fn relay_timeout(&self) -> Duration {
        Duration::from_millis(self.relay_timeout_ms)
    }

    pub fn bridge_settings(&self, config: &SdkConfig) -> BridgeSettings {
        let optional = |ms: u64| (ms > 0).then(|| Duration::from_millis(ms));
        BridgeSettings {
            call_timeout: optional(self.bridge_call_timeout_ms),
            connect_timeout: optional(self.bridge_connect_timeout_ms),
            ..BridgeSettings::for_config(config, self.widget_url.as_deref())
        }
    }
}
