//! Widget reached over HTTP, for hosts without a page (CLIs, services).
//!
//! The widget service accepts `POST <url>/connect` once and
//! `POST <url>/rpc` with `{"method", "args"}` per call. A call response is
//! `{"reply": {error, result}, "events": [...]}`; events are the widget's
//! callbacks (`setHeight`, `onLogin`, `onLogout`, `onActiveWalletChanged`,
//! `onError`) queued since the previous call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use wallet_bridge_core::{
    MountRequest, RemoteMethod, SdkError, SurfaceHandle, WidgetCallbacks, WidgetChannel,
    WidgetHost, WindowSize,
};

#[derive(Debug, Deserialize)]
struct CallResponse {
    #[serde(default)]
    reply: Option<Value>,
    #[serde(default)]
    events: Vec<WidgetEvent>,
}

#[derive(Debug, Deserialize)]
struct WidgetEvent {
    name: String,
    #[serde(default)]
    args: Vec<Value>,
}

fn string_arg(args: &[Value], index: usize) -> Option<String> {
    args.get(index).and_then(Value::as_str).map(str::to_owned)
}

fn dispatch_event(callbacks: &dyn WidgetCallbacks, event: WidgetEvent) {
    match event.name.as_str() {
        "setHeight" => {
            let height = event.args.first().and_then(Value::as_u64).unwrap_or_default();
            callbacks.set_height(u32::try_from(height).unwrap_or(u32::MAX));
        }
        "onLogin" => match string_arg(&event.args, 0) {
            Some(address) => callbacks.on_login(
                address,
                string_arg(&event.args, 1),
                string_arg(&event.args, 2),
            ),
            None => tracing::warn!("onLogin event without an address"),
        },
        "onLogout" => callbacks.on_logout(),
        "onActiveWalletChanged" => {
            if let Some(address) = string_arg(&event.args, 0) {
                callbacks.on_active_wallet_changed(address);
            }
        }
        "onError" => callbacks.on_error(event.args.into_iter().next().unwrap_or(Value::Null)),
        other => tracing::debug!(event = other, "ignoring unknown widget event"),
    }
}

pub struct HttpWidgetChannel {
    client: reqwest::Client,
    rpc_url: String,
    callbacks: Arc<dyn WidgetCallbacks>,
}

impl HttpWidgetChannel {
    async fn post(&self, body: &Value) -> Result<CallResponse, SdkError> {
        let response = self
            .client
            .post(&self.rpc_url)
            .json(body)
            .send()
            .await
            .map_err(|e| SdkError::Bridge(format!("widget request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SdkError::Bridge(format!("widget responded with status {status}")));
        }
        response
            .json()
            .await
            .map_err(|e| SdkError::Bridge(format!("widget json decode failed: {e}")))
    }
}

#[async_trait]
impl WidgetChannel for HttpWidgetChannel {
    async fn call(&self, method: RemoteMethod, args: Vec<Value>) -> Result<Value, SdkError> {
        let response = self
            .post(&json!({ "method": method.name(), "args": args }))
            .await?;
        for event in response.events {
            dispatch_event(self.callbacks.as_ref(), event);
        }
        response
            .reply
            .ok_or_else(|| SdkError::Bridge(format!("widget sent no reply to {}", method.name())))
    }
}

/// Host without a page: mounting is bookkeeping, the widget is a service.
pub struct HeadlessWidgetHost {
    client: reqwest::Client,
    connect_timeout: Duration,
    origin: Option<String>,
    window: WindowSize,
    heights: Mutex<HashMap<String, u32>>,
}

impl std::fmt::Debug for HeadlessWidgetHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessWidgetHost")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl HeadlessWidgetHost {
    /// `connect_timeout` bounds reaching the service and the `/connect`
    /// handshake. Widget calls are left to the bridge's call timeout, since
    /// they may wait on the user.
    pub fn new(connect_timeout: Duration) -> Result<Self, SdkError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| SdkError::Configuration(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            connect_timeout,
            origin: None,
            window: WindowSize {
                width: 0,
                height: 0,
            },
            heights: Mutex::new(HashMap::new()),
        })
    }

    /// Reports `origin` as the page origin, subjecting it to the secure
    /// origin check.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn surface_height(&self, surface: &SurfaceHandle) -> Option<u32> {
        self.heights
            .lock()
            .ok()
            .and_then(|g| g.get(&surface.id).copied())
    }
}

#[async_trait]
impl WidgetHost for HeadlessWidgetHost {
    fn origin(&self) -> Option<String> {
        self.origin.clone()
    }

    async fn wait_until_loaded(&self) -> Result<(), SdkError> {
        Ok(())
    }

    async fn mount(&self, request: &MountRequest) -> Result<SurfaceHandle, SdkError> {
        Ok(SurfaceHandle {
            id: format!("headless-{}", request.instance_id),
        })
    }

    async fn connect(
        &self,
        surface: &SurfaceHandle,
        widget_url: &str,
        callbacks: Arc<dyn WidgetCallbacks>,
    ) -> Result<Arc<dyn WidgetChannel>, SdkError> {
        let base = widget_url.trim_end_matches('/');
        let response = self
            .client
            .post(format!("{base}/connect"))
            .timeout(self.connect_timeout)
            .json(&json!({ "surface": surface.id }))
            .send()
            .await
            .map_err(|e| SdkError::Bridge(format!("widget connect failed: {e}")))?;
        if !response.status().is_success() {
            return Err(SdkError::Bridge(format!(
                "widget refused connection with status {}",
                response.status()
            )));
        }
        Ok(Arc::new(HttpWidgetChannel {
            client: self.client.clone(),
            rpc_url: format!("{base}/rpc"),
            callbacks,
        }))
    }

    fn set_surface_height(&self, surface: &SurfaceHandle, height_px: u32) {
        if let Ok(mut g) = self.heights.lock() {
            g.insert(surface.id.clone(), height_px);
        }
    }

    fn window_size(&self) -> WindowSize {
        self.window
    }
}
