//! In-process widget host and widget, for tests and headless embedding.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use alloy::primitives::keccak256;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::watch;

use wallet_bridge_core::{
    JsonRpcRequest, MountRequest, RemoteMethod, SdkError, SurfaceHandle, WidgetCallbacks,
    WidgetChannel, WidgetHost, WindowSize,
};

/// Node behind the in-memory widget: `Ok(result)` or `Err(error)`.
pub type RelayHandler = Arc<dyn Fn(&JsonRpcRequest) -> Result<Value, Value> + Send + Sync>;

#[derive(Default)]
struct WidgetState {
    accounts: Vec<String>,
    email: Option<String>,
    logged_in: bool,
    deny_signing: bool,
    relay: Option<RelayHandler>,
    hanging: HashSet<RemoteMethod>,
    calls: Vec<(RemoteMethod, Vec<Value>)>,
    pushed_config: Option<Value>,
    persisted_session: Option<Value>,
    callbacks: Option<Arc<dyn WidgetCallbacks>>,
}

/// A widget that keeps a wallet in memory. Signatures are keccak digests of
/// the payload, not real signatures.
#[derive(Clone, Default)]
pub struct InMemoryWidget {
    inner: Arc<Mutex<WidgetState>>,
}

impl std::fmt::Debug for InMemoryWidget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryWidget").finish_non_exhaustive()
    }
}

fn poisoned(what: &str) -> SdkError {
    SdkError::Bridge(format!("in-memory widget {what} lock poisoned"))
}

fn reply(result: Value) -> Value {
    json!({ "error": null, "result": result })
}

fn reply_err(error: impl Into<Value>) -> Value {
    json!({ "error": error.into(), "result": null })
}

impl InMemoryWidget {
    pub fn with_accounts(accounts: &[&str]) -> Self {
        let widget = Self::default();
        if let Ok(mut g) = widget.inner.lock() {
            g.accounts = accounts.iter().map(|a| (*a).to_owned()).collect();
        }
        widget
    }

    pub fn set_relay(&self, handler: impl Fn(&JsonRpcRequest) -> Result<Value, Value> + Send + Sync + 'static) {
        if let Ok(mut g) = self.inner.lock() {
            g.relay = Some(Arc::new(handler));
        }
    }

    pub fn set_email(&self, email: &str) {
        if let Ok(mut g) = self.inner.lock() {
            g.email = Some(email.to_owned());
        }
    }

    pub fn deny_signing(&self, deny: bool) {
        if let Ok(mut g) = self.inner.lock() {
            g.deny_signing = deny;
        }
    }

    /// Calls to `method` never resolve.
    pub fn hang(&self, method: RemoteMethod) {
        if let Ok(mut g) = self.inner.lock() {
            g.hanging.insert(method);
        }
    }

    pub fn persist_session(&self, session: Value) {
        if let Ok(mut g) = self.inner.lock() {
            g.persisted_session = Some(session);
        }
    }

    pub fn calls(&self) -> Vec<(RemoteMethod, Vec<Value>)> {
        self.inner.lock().map(|g| g.calls.clone()).unwrap_or_default()
    }

    pub fn calls_to(&self, method: RemoteMethod) -> usize {
        self.calls().iter().filter(|(m, _)| *m == method).count()
    }

    pub fn pushed_config(&self) -> Option<Value> {
        self.inner.lock().ok().and_then(|g| g.pushed_config.clone())
    }

    pub fn is_logged_in(&self) -> bool {
        self.inner.lock().map(|g| g.logged_in).unwrap_or(false)
    }

    /// Simulates the user logging out inside the widget.
    pub fn user_logout(&self) {
        let callbacks = match self.inner.lock() {
            Ok(mut g) => {
                g.logged_in = false;
                g.callbacks.clone()
            }
            Err(_) => None,
        };
        if let Some(callbacks) = callbacks {
            callbacks.on_logout();
        }
    }

    /// Simulates the user switching the active wallet inside the widget.
    pub fn switch_wallet(&self, address: &str) {
        let callbacks = match self.inner.lock() {
            Ok(mut g) => {
                g.accounts.retain(|a| a != address);
                g.accounts.insert(0, address.to_owned());
                g.callbacks.clone()
            }
            Err(_) => None,
        };
        if let Some(callbacks) = callbacks {
            callbacks.on_active_wallet_changed(address.to_owned());
        }
    }

    fn attach(&self, callbacks: Arc<dyn WidgetCallbacks>) -> Result<(), SdkError> {
        self.inner.lock().map_err(|_| poisoned("state"))?.callbacks = Some(callbacks);
        Ok(())
    }

    fn login(&self) -> Result<Vec<String>, SdkError> {
        let (first_login, accounts, email, callbacks) = {
            let mut g = self.inner.lock().map_err(|_| poisoned("state"))?;
            let first_login = !g.logged_in;
            g.logged_in = true;
            (first_login, g.accounts.clone(), g.email.clone(), g.callbacks.clone())
        };
        if first_login {
            if let (Some(callbacks), Some(address)) = (callbacks, accounts.first()) {
                callbacks.on_login(address.clone(), email, None);
            }
        }
        Ok(accounts)
    }

    fn answer(&self, method: RemoteMethod, args: &[Value]) -> Result<Value, SdkError> {
        let first = args.first().cloned().unwrap_or(Value::Null);
        let out = match method {
            RemoteMethod::GetAccounts => reply(json!(self.login()?)),
            RemoteMethod::SignTransaction | RemoteMethod::SignMessage => {
                let deny = self.inner.lock().map_err(|_| poisoned("state"))?.deny_signing;
                if deny {
                    reply_err("User denied signature")
                } else {
                    let digest = keccak256(first.to_string().as_bytes());
                    match method {
                        RemoteMethod::SignTransaction => reply(json!({ "raw": digest.to_string() })),
                        _ => reply(json!(digest.to_string())),
                    }
                }
            }
            RemoteMethod::Relay => {
                let request: JsonRpcRequest = serde_json::from_value(first)
                    .map_err(|e| SdkError::Bridge(format!("relay payload is not JSON-RPC: {e}")))?;
                let handler = self.inner.lock().map_err(|_| poisoned("state"))?.relay.clone();
                match handler {
                    Some(handler) => match handler(&request) {
                        Ok(result) => reply(result),
                        Err(error) => reply_err(error),
                    },
                    None => reply_err(format!("no node configured for {}", request.method)),
                }
            }
            RemoteMethod::ShowPortis | RemoteMethod::ShowBitcoinWallet => reply(json!(true)),
            RemoteMethod::ImportWallet => {
                let secret = first.as_str().unwrap_or_default();
                let address = format!("0x{}", &keccak256(secret.as_bytes()).to_string()[26..]);
                self.inner
                    .lock()
                    .map_err(|_| poisoned("state"))?
                    .accounts
                    .insert(0, address.clone());
                reply(json!(address))
            }
            RemoteMethod::GetExtendedPublicKey => {
                let path = first.as_str().unwrap_or_default();
                let coin = args.get(1).and_then(Value::as_str).unwrap_or_default();
                reply(json!(format!("xpub-{coin}-{}", keccak256(path.as_bytes()))))
            }
            RemoteMethod::Logout => {
                self.user_logout();
                reply(json!(true))
            }
            RemoteMethod::IsLoggedIn => reply(json!(self.is_logged_in())),
            RemoteMethod::SignBitcoinTransaction => {
                let digest = keccak256(first.to_string().as_bytes());
                reply(json!({
                    "serializedTx": digest.to_string(),
                    "txid": keccak256(digest.as_slice()).to_string(),
                }))
            }
            RemoteMethod::SetSdkConfig => {
                self.inner.lock().map_err(|_| poisoned("state"))?.pushed_config = Some(first);
                reply(Value::Null)
            }
            RemoteMethod::RetrieveSession => {
                let session = self
                    .inner
                    .lock()
                    .map_err(|_| poisoned("state"))?
                    .persisted_session
                    .clone();
                reply(session.unwrap_or(Value::Null))
            }
        };
        Ok(out)
    }
}

#[async_trait]
impl WidgetChannel for InMemoryWidget {
    async fn call(&self, method: RemoteMethod, args: Vec<Value>) -> Result<Value, SdkError> {
        let hang = {
            let mut g = self.inner.lock().map_err(|_| poisoned("state"))?;
            g.calls.push((method, args.clone()));
            g.hanging.contains(&method)
        };
        if hang {
            futures::future::pending::<()>().await;
        }
        self.answer(method, &args)
    }
}

#[derive(Debug)]
struct HostState {
    origin: Option<String>,
    window: WindowSize,
    mounts: usize,
    heights: HashMap<String, u32>,
    connect_hangs: bool,
}

/// A page that mounts an [`InMemoryWidget`].
#[derive(Clone)]
pub struct InMemoryHost {
    widget: InMemoryWidget,
    loaded: Arc<watch::Sender<bool>>,
    inner: Arc<Mutex<HostState>>,
}

impl std::fmt::Debug for InMemoryHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryHost")
            .field("state", &self.inner)
            .finish_non_exhaustive()
    }
}

impl InMemoryHost {
    /// An already loaded page on a secure origin.
    pub fn in_memory(widget: InMemoryWidget) -> Self {
        let host = Self::loading(widget);
        host.finish_loading();
        host
    }

    /// A page that is still loading until [`InMemoryHost::finish_loading`].
    pub fn loading(widget: InMemoryWidget) -> Self {
        let (loaded, _) = watch::channel(false);
        Self {
            widget,
            loaded: Arc::new(loaded),
            inner: Arc::new(Mutex::new(HostState {
                origin: Some("https://dapp.example".to_owned()),
                window: WindowSize {
                    width: 1280,
                    height: 800,
                },
                mounts: 0,
                heights: HashMap::new(),
                connect_hangs: false,
            })),
        }
    }

    pub fn with_origin(self, origin: Option<&str>) -> Self {
        if let Ok(mut g) = self.inner.lock() {
            g.origin = origin.map(str::to_owned);
        }
        self
    }

    pub fn finish_loading(&self) {
        self.loaded.send_replace(true);
    }

    /// The connection handshake never completes.
    pub fn hang_connect(&self) {
        if let Ok(mut g) = self.inner.lock() {
            g.connect_hangs = true;
        }
    }

    pub fn widget(&self) -> &InMemoryWidget {
        &self.widget
    }

    pub fn mounts(&self) -> usize {
        self.inner.lock().map(|g| g.mounts).unwrap_or_default()
    }

    pub fn surface_height(&self, surface: &SurfaceHandle) -> Option<u32> {
        self.inner
            .lock()
            .ok()
            .and_then(|g| g.heights.get(&surface.id).copied())
    }
}

#[async_trait]
impl WidgetHost for InMemoryHost {
    fn origin(&self) -> Option<String> {
        self.inner.lock().ok().and_then(|g| g.origin.clone())
    }

    async fn wait_until_loaded(&self) -> Result<(), SdkError> {
        let mut rx = self.loaded.subscribe();
        rx.wait_for(|loaded| *loaded)
            .await
            .map(|_| ())
            .map_err(|_| SdkError::Bridge("page unloaded before the widget was mounted".to_owned()))
    }

    async fn mount(&self, request: &MountRequest) -> Result<SurfaceHandle, SdkError> {
        let mut g = self.inner.lock().map_err(|_| poisoned("host"))?;
        g.mounts += 1;
        Ok(SurfaceHandle {
            id: format!("wallet-bridge-{}-{}", request.instance_id, g.mounts),
        })
    }

    async fn connect(
        &self,
        _surface: &SurfaceHandle,
        _widget_url: &str,
        callbacks: Arc<dyn WidgetCallbacks>,
    ) -> Result<Arc<dyn WidgetChannel>, SdkError> {
        let hangs = self.inner.lock().map_err(|_| poisoned("host"))?.connect_hangs;
        if hangs {
            futures::future::pending::<()>().await;
        }
        self.widget.attach(callbacks)?;
        Ok(Arc::new(self.widget.clone()))
    }

    fn set_surface_height(&self, surface: &SurfaceHandle, height_px: u32) {
        if let Ok(mut g) = self.inner.lock() {
            g.heights.insert(surface.id.clone(), height_px);
        }
    }

    fn window_size(&self) -> WindowSize {
        self.inner
            .lock()
            .map(|g| g.window)
            .unwrap_or(WindowSize {
                width: 0,
                height: 0,
            })
    }
}
