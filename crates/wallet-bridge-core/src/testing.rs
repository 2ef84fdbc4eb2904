//! Scripted widget host shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::bridge::{Bridge, BridgeSettings};
use crate::config::SdkConfig;
use crate::context::SdkContext;
use crate::domain::{JsonRpcRequest, NetworkDescriptor, WindowSize};
use crate::error::SdkError;
use crate::pipeline::Pipeline;
use crate::ports::{
    MountRequest, RemoteMethod, SurfaceHandle, WidgetCallbacks, WidgetChannel, WidgetHost,
};
use crate::stages::{standard_pipeline, DirectRelay};

pub(crate) fn sample_config() -> SdkConfig {
    SdkConfig {
        dapp_id: "x".to_owned(),
        network: NetworkDescriptor::new("http://localhost:8545", Some("1337")),
        version: "test".to_owned(),
        scope: Vec::new(),
        default_email: None,
        register_page_by_default: None,
        staging: false,
    }
}

#[derive(Default)]
struct FakeState {
    mounts: usize,
    connect_error: Option<String>,
    hanging: HashSet<RemoteMethod>,
    replies: HashMap<RemoteMethod, Value>,
    relay: HashMap<String, Value>,
    calls: Vec<(RemoteMethod, Vec<Value>)>,
    callbacks: Option<Arc<dyn WidgetCallbacks>>,
}

#[derive(Default)]
pub(crate) struct FakeHost {
    state: Arc<Mutex<FakeState>>,
}

impl FakeHost {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn mounts(&self) -> usize {
        self.state.lock().expect("fake state").mounts
    }

    pub(crate) fn calls_to(&self, method: RemoteMethod) -> usize {
        let state = self.state.lock().expect("fake state");
        state.calls.iter().filter(|(m, _)| *m == method).count()
    }

    pub(crate) fn last_args(&self, method: RemoteMethod) -> Option<Vec<Value>> {
        let state = self.state.lock().expect("fake state");
        state
            .calls
            .iter()
            .rev()
            .find(|(m, _)| *m == method)
            .map(|(_, args)| args.clone())
    }

    /// JSON-RPC requests the widget was asked to relay, in order.
    pub(crate) fn relayed(&self) -> Vec<JsonRpcRequest> {
        let state = self.state.lock().expect("fake state");
        state
            .calls
            .iter()
            .filter(|(m, _)| *m == RemoteMethod::Relay)
            .filter_map(|(_, args)| serde_json::from_value(args.first()?.clone()).ok())
            .collect()
    }

    pub(crate) fn fail_connect(&self, message: &str) {
        self.state.lock().expect("fake state").connect_error = Some(message.to_owned());
    }

    pub(crate) fn hang(&self, method: RemoteMethod) {
        self.state.lock().expect("fake state").hanging.insert(method);
    }

    /// Full `{error, result}` reply for `method`.
    pub(crate) fn reply(&self, method: RemoteMethod, reply: Value) {
        self.state.lock().expect("fake state").replies.insert(method, reply);
    }

    /// Result the widget's node returns for the relayed JSON-RPC `method`.
    pub(crate) fn relay_result(&self, method: &str, result: Value) {
        self.state
            .lock()
            .expect("fake state")
            .relay
            .insert(method.to_owned(), result);
    }

    pub(crate) fn callbacks(&self) -> Option<Arc<dyn WidgetCallbacks>> {
        self.state.lock().expect("fake state").callbacks.clone()
    }
}

#[async_trait]
impl WidgetHost for FakeHost {
    fn origin(&self) -> Option<String> {
        Some("https://dapp.example".to_owned())
    }

    async fn wait_until_loaded(&self) -> Result<(), SdkError> {
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn mount(&self, request: &MountRequest) -> Result<SurfaceHandle, SdkError> {
        self.state.lock().expect("fake state").mounts += 1;
        Ok(SurfaceHandle {
            id: format!("widget-{}", request.instance_id),
        })
    }

    async fn connect(
        &self,
        _surface: &SurfaceHandle,
        _widget_url: &str,
        callbacks: Arc<dyn WidgetCallbacks>,
    ) -> Result<Arc<dyn WidgetChannel>, SdkError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().expect("fake state");
        if let Some(message) = &state.connect_error {
            return Err(SdkError::Bridge(message.clone()));
        }
        state.callbacks = Some(callbacks);
        Ok(Arc::new(FakeChannel {
            state: Arc::clone(&self.state),
        }))
    }

    fn set_surface_height(&self, _surface: &SurfaceHandle, _height_px: u32) {}

    fn window_size(&self) -> WindowSize {
        WindowSize {
            width: 1280,
            height: 800,
        }
    }
}

struct FakeChannel {
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl WidgetChannel for FakeChannel {
    async fn call(&self, method: RemoteMethod, args: Vec<Value>) -> Result<Value, SdkError> {
        let (hang, reply) = {
            let mut state = self.state.lock().expect("fake state");
            state.calls.push((method, args.clone()));
            let reply = if method == RemoteMethod::Relay {
                let rpc_method = args
                    .first()
                    .and_then(|p| p.get("method"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                match state.relay.get(rpc_method) {
                    Some(result) => json!({"error": null, "result": result}),
                    None => json!({"error": format!("no fixture for {rpc_method}"), "result": null}),
                }
            } else {
                state
                    .replies
                    .get(&method)
                    .cloned()
                    .unwrap_or_else(|| json!({"error": null, "result": null}))
            };
            (state.hanging.contains(&method), reply)
        };
        if hang {
            futures::future::pending::<()>().await;
        }
        Ok(reply)
    }
}

/// A context, a standard pipeline relaying through the widget, and the
/// fake host behind it.
pub(crate) fn direct_pipeline() -> (Arc<SdkContext>, Pipeline, Arc<FakeHost>) {
    let host = FakeHost::new();
    let context = SdkContext::new(sample_config());
    let bridge = Arc::new(Bridge::new(
        host.clone(),
        Arc::clone(context.session()),
        BridgeSettings::default(),
    ));
    let backend = Arc::new(DirectRelay::new(Arc::clone(&bridge)));
    let pipeline = standard_pipeline(Arc::clone(&context), bridge, backend);
    (context, pipeline, host)
}
