//! Lazily established, memoized connection to the widget.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use crate::config::SdkConfig;
use crate::domain::{
    BtcSignTxRequest, BtcSignedTx, JsonRpcRequest, MessageParams, WidgetReply, WindowSize,
};
use crate::error::SdkError;
use crate::ports::{
    MountRequest, RemoteMethod, SurfaceHandle, WidgetCallbacks, WidgetChannel, WidgetHost,
};
use crate::session::SessionState;

pub const WIDGET_URL: &str = "https://widget.portis.io";
pub const STAGING_WIDGET_URL: &str = "https://widget-staging.portis.io";

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);
static LIVE_INSTANCES: LazyLock<Mutex<HashSet<u64>>> = LazyLock::new(Default::default);
static MOUNTED_INSTANCES: LazyLock<Mutex<HashSet<u64>>> = LazyLock::new(Default::default);

/// How the widget learns about the dapp's session once connected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionBootstrap {
    /// Push the current configuration with `setSdkConfig`.
    #[default]
    Push,
    /// Ask the widget for a session it persisted earlier.
    Pull,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    pub widget_url: String,
    pub bootstrap: SessionBootstrap,
    /// Upper bound for each remote call. `None` waits indefinitely.
    pub call_timeout: Option<Duration>,
    /// Upper bound for the whole connection handshake.
    pub connect_timeout: Option<Duration>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            widget_url: WIDGET_URL.to_owned(),
            bootstrap: SessionBootstrap::Push,
            call_timeout: None,
            connect_timeout: None,
        }
    }
}

impl BridgeSettings {
    /// Settings for `config`; a staging configuration always talks to the
    /// staging widget.
    pub fn for_config(config: &SdkConfig, widget_url: Option<&str>) -> Self {
        let widget_url = if config.staging {
            tracing::warn!("using the STAGING widget environment");
            STAGING_WIDGET_URL.to_owned()
        } else {
            widget_url.unwrap_or(WIDGET_URL).to_owned()
        };
        Self {
            widget_url,
            ..Self::default()
        }
    }
}

/// Arguments of `onLogin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginEvent {
    pub address: String,
    pub email: Option<String>,
    pub reputation: Option<String>,
}

type LoginHandler = Arc<dyn Fn(&LoginEvent) + Send + Sync>;
type LogoutHandler = Arc<dyn Fn() + Send + Sync>;
type WalletChangedHandler = Arc<dyn Fn(&str) + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    login: Option<LoginHandler>,
    logout: Option<LogoutHandler>,
    active_wallet_changed: Option<WalletChangedHandler>,
    error: Option<ErrorHandler>,
}

/// User handlers for widget-originated events. Setting one replaces the
/// previous handler.
#[derive(Default)]
pub struct EventHandlers {
    inner: Mutex<Handlers>,
}

impl std::fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandlers").finish_non_exhaustive()
    }
}

impl EventHandlers {
    pub fn set_on_login(&self, handler: impl Fn(&LoginEvent) + Send + Sync + 'static) {
        lock_or_recover!(self.inner).login = Some(Arc::new(handler));
    }

    pub fn set_on_logout(&self, handler: impl Fn() + Send + Sync + 'static) {
        lock_or_recover!(self.inner).logout = Some(Arc::new(handler));
    }

    pub fn set_on_active_wallet_changed(&self, handler: impl Fn(&str) + Send + Sync + 'static) {
        lock_or_recover!(self.inner).active_wallet_changed = Some(Arc::new(handler));
    }

    pub fn set_on_error(&self, handler: impl Fn(&Value) + Send + Sync + 'static) {
        lock_or_recover!(self.inner).error = Some(Arc::new(handler));
    }
}

/// The callback table registered with the widget on connect.
struct BridgeCallbacks {
    host: Arc<dyn WidgetHost>,
    surface: SurfaceHandle,
    session: Arc<SessionState>,
    handlers: Arc<EventHandlers>,
}

impl WidgetCallbacks for BridgeCallbacks {
    fn set_height(&self, height_px: u32) {
        self.host.set_surface_height(&self.surface, height_px);
    }

    fn get_window_size(&self) -> WindowSize {
        self.host.window_size()
    }

    fn on_login(&self, address: String, email: Option<String>, reputation: Option<String>) {
        let handler = lock_or_recover!(self.handlers.inner).login.clone();
        if let Some(handler) = handler {
            handler(&LoginEvent {
                address,
                email,
                reputation,
            });
        }
    }

    fn on_logout(&self) {
        self.session.clear_selected_address();
        let handler = lock_or_recover!(self.handlers.inner).logout.clone();
        if let Some(handler) = handler {
            handler();
        }
    }

    fn on_active_wallet_changed(&self, address: String) {
        let handler = lock_or_recover!(self.handlers.inner)
            .active_wallet_changed
            .clone();
        if let Some(handler) = handler {
            handler(&address);
        }
    }

    fn on_error(&self, error: Value) {
        let handler = lock_or_recover!(self.handlers.inner).error.clone();
        match handler {
            Some(handler) => handler(&error),
            None => tracing::error!(%error, "widget reported an error"),
        }
    }
}

/// A connected widget: the surface it lives in and the channel to it.
pub struct WidgetSession {
    pub surface: SurfaceHandle,
    channel: Arc<dyn WidgetChannel>,
}

impl std::fmt::Debug for WidgetSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetSession")
            .field("surface", &self.surface)
            .finish_non_exhaustive()
    }
}

pub struct Bridge {
    instance_id: u64,
    host: Arc<dyn WidgetHost>,
    session: Arc<SessionState>,
    settings: BridgeSettings,
    handlers: Arc<EventHandlers>,
    connection: OnceCell<Result<Arc<WidgetSession>, SdkError>>,
}

impl Bridge {
    /// Registers a new instance in the per-process registry. Nothing is
    /// mounted until the first call that needs the widget.
    pub fn new(
        host: Arc<dyn WidgetHost>,
        session: Arc<SessionState>,
        settings: BridgeSettings,
    ) -> Self {
        let instance_id = NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed);
        {
            let mut live = lock_or_recover!(LIVE_INSTANCES);
            if !live.is_empty() {
                tracing::warn!(
                    instance_id,
                    live = live.len(),
                    "a wallet SDK instance already exists in this process; use a single instance"
                );
            }
            live.insert(instance_id);
        }
        Self {
            instance_id,
            host,
            session,
            settings,
            handlers: Arc::new(EventHandlers::default()),
            connection: OnceCell::new(),
        }
    }

    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn handlers(&self) -> &EventHandlers {
        &self.handlers
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.connection.get(), Some(Ok(_)))
    }

    /// The widget connection, established by the first caller. Concurrent
    /// callers wait for that same attempt; its outcome, success or failure,
    /// is kept for the lifetime of the instance.
    pub async fn connection(&self, config: &SdkConfig) -> Result<Arc<WidgetSession>, SdkError> {
        self.connection
            .get_or_init(|| self.establish(config))
            .await
            .clone()
    }

    async fn establish(&self, config: &SdkConfig) -> Result<Arc<WidgetSession>, SdkError> {
        bounded(self.settings.connect_timeout, "widget connection", async {
            self.host.wait_until_loaded().await?;

            if !lock_or_recover!(MOUNTED_INSTANCES).insert(self.instance_id) {
                return Err(SdkError::Bridge(format!(
                    "widget already mounted for instance {}",
                    self.instance_id
                )));
            }
            let surface = self
                .host
                .mount(&MountRequest {
                    instance_id: self.instance_id,
                    widget_url: self.settings.widget_url.clone(),
                })
                .await?;
            tracing::info!(surface = %surface.id, url = %self.settings.widget_url, "widget mounted");

            let callbacks = Arc::new(BridgeCallbacks {
                host: Arc::clone(&self.host),
                surface: surface.clone(),
                session: Arc::clone(&self.session),
                handlers: Arc::clone(&self.handlers),
            });
            let channel = self
                .host
                .connect(&surface, &self.settings.widget_url, callbacks)
                .await?;

            let (method, args) = match self.settings.bootstrap {
                SessionBootstrap::Push => (RemoteMethod::SetSdkConfig, vec![config_value(config)?]),
                SessionBootstrap::Pull => (RemoteMethod::RetrieveSession, vec![config_value(config)?]),
            };
            let reply: WidgetReply<Value> = decode(method, channel.call(method, args).await?)?;
            if reply.is_error() {
                tracing::warn!(method = method.name(), error = ?reply.error, "session bootstrap failed");
            }

            tracing::info!(instance_id = self.instance_id, "widget connected");
            Ok(Arc::new(WidgetSession { surface, channel }))
        })
        .await
        .inspect_err(|err| tracing::warn!(error = %err, "widget connection failed"))
    }

    async fn invoke<T: DeserializeOwned>(
        &self,
        method: RemoteMethod,
        mut args: Vec<Value>,
        config: Option<&SdkConfig>,
        connect_with: &SdkConfig,
    ) -> Result<WidgetReply<T>, SdkError> {
        let session = self.connection(connect_with).await?;
        if let Some(config) = config {
            args.push(config_value(config)?);
        }
        tracing::debug!(method = method.name(), "calling widget");
        let raw = bounded(
            self.settings.call_timeout,
            method.name(),
            session.channel.call(method, args),
        )
        .await?;
        decode(method, raw)
    }

    pub async fn get_accounts(&self, config: &SdkConfig) -> Result<WidgetReply<Vec<String>>, SdkError> {
        self.invoke(RemoteMethod::GetAccounts, Vec::new(), Some(config), config)
            .await
    }

    pub async fn sign_transaction(
        &self,
        tx: Value,
        config: &SdkConfig,
    ) -> Result<WidgetReply<Value>, SdkError> {
        self.invoke(RemoteMethod::SignTransaction, vec![tx], Some(config), config)
            .await
    }

    pub async fn sign_message(
        &self,
        params: &MessageParams,
        config: &SdkConfig,
    ) -> Result<WidgetReply<Value>, SdkError> {
        let params = serde_json::to_value(params)
            .map_err(|e| SdkError::Validation(format!("unencodable message params: {e}")))?;
        self.invoke(RemoteMethod::SignMessage, vec![params], Some(config), config)
            .await
    }

    /// Forwards a whole JSON-RPC payload for the widget to send to its node.
    pub async fn relay(
        &self,
        request: &JsonRpcRequest,
        config: &SdkConfig,
    ) -> Result<WidgetReply<Value>, SdkError> {
        let payload = serde_json::to_value(request)
            .map_err(|e| SdkError::Validation(format!("unencodable request: {e}")))?;
        self.invoke(RemoteMethod::Relay, vec![payload], Some(config), config)
            .await
    }

    pub async fn show_portis(&self, config: &SdkConfig) -> Result<WidgetReply<Value>, SdkError> {
        self.invoke(RemoteMethod::ShowPortis, Vec::new(), Some(config), config)
            .await
    }

    pub async fn import_wallet(
        &self,
        mnemonic_or_private_key: &str,
        config: &SdkConfig,
    ) -> Result<WidgetReply<Value>, SdkError> {
        self.invoke(
            RemoteMethod::ImportWallet,
            vec![json!(mnemonic_or_private_key)],
            Some(config),
            config,
        )
        .await
    }

    pub async fn get_extended_public_key(
        &self,
        path: &str,
        coin: &str,
        config: &SdkConfig,
    ) -> Result<WidgetReply<String>, SdkError> {
        self.invoke(
            RemoteMethod::GetExtendedPublicKey,
            vec![json!(path), json!(coin)],
            Some(config),
            config,
        )
        .await
    }

    pub async fn logout(&self, config: &SdkConfig) -> Result<WidgetReply<bool>, SdkError> {
        self.invoke(RemoteMethod::Logout, Vec::new(), None, config)
            .await
    }

    pub async fn is_logged_in(&self, config: &SdkConfig) -> Result<WidgetReply<bool>, SdkError> {
        self.invoke(RemoteMethod::IsLoggedIn, Vec::new(), None, config)
            .await
    }

    pub async fn sign_bitcoin_transaction(
        &self,
        request: &BtcSignTxRequest,
        config: &SdkConfig,
    ) -> Result<WidgetReply<BtcSignedTx>, SdkError> {
        let request = serde_json::to_value(request)
            .map_err(|e| SdkError::Validation(format!("unencodable bitcoin transaction: {e}")))?;
        self.invoke(
            RemoteMethod::SignBitcoinTransaction,
            vec![request],
            Some(config),
            config,
        )
        .await
    }

    pub async fn show_bitcoin_wallet(
        &self,
        path: &str,
        config: &SdkConfig,
    ) -> Result<WidgetReply<Value>, SdkError> {
        self.invoke(
            RemoteMethod::ShowBitcoinWallet,
            vec![json!(path)],
            Some(config),
            config,
        )
        .await
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("instance_id", &self.instance_id)
            .field("settings", &self.settings)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        lock_or_recover!(LIVE_INSTANCES).remove(&self.instance_id);
        lock_or_recover!(MOUNTED_INSTANCES).remove(&self.instance_id);
    }
}

fn config_value(config: &SdkConfig) -> Result<Value, SdkError> {
    serde_json::to_value(config)
        .map_err(|e| SdkError::Configuration(format!("unencodable sdk config: {e}")))
}

fn decode<T: DeserializeOwned>(method: RemoteMethod, raw: Value) -> Result<WidgetReply<T>, SdkError> {
    serde_json::from_value(raw)
        .map_err(|e| SdkError::Bridge(format!("malformed {} reply: {e}", method.name())))
}

/// Runs `fut`, failing with [`SdkError::Timeout`] once `limit` elapses.
pub(crate) async fn bounded<T, F>(
    limit: Option<Duration>,
    operation: &'static str,
    fut: F,
) -> Result<T, SdkError>
where
    F: Future<Output = Result<T, SdkError>>,
{
    let Some(limit) = limit else {
        return fut.await;
    };
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| SdkError::Timeout {
            operation,
            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        })?
}
