use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::RequestContext;
use crate::domain::{JsonRpcRequest, WindowSize};
use crate::error::{RpcError, SdkError};

/// Methods the widget exposes over the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteMethod {
    GetAccounts,
    SignTransaction,
    SignMessage,
    Relay,
    ShowPortis,
    ImportWallet,
    GetExtendedPublicKey,
    Logout,
    IsLoggedIn,
    SignBitcoinTransaction,
    ShowBitcoinWallet,
    SetSdkConfig,
    RetrieveSession,
}

impl RemoteMethod {
    pub const ALL: [RemoteMethod; 13] = [
        Self::GetAccounts,
        Self::SignTransaction,
        Self::SignMessage,
        Self::Relay,
        Self::ShowPortis,
        Self::ImportWallet,
        Self::GetExtendedPublicKey,
        Self::Logout,
        Self::IsLoggedIn,
        Self::SignBitcoinTransaction,
        Self::ShowBitcoinWallet,
        Self::SetSdkConfig,
        Self::RetrieveSession,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::GetAccounts => "getAccounts",
            Self::SignTransaction => "signTransaction",
            Self::SignMessage => "signMessage",
            Self::Relay => "relay",
            Self::ShowPortis => "showPortis",
            Self::ImportWallet => "importWallet",
            Self::GetExtendedPublicKey => "getExtendedPublicKey",
            Self::Logout => "logout",
            Self::IsLoggedIn => "isLoggedIn",
            Self::SignBitcoinTransaction => "signBitcoinTransaction",
            Self::ShowBitcoinWallet => "showBitcoinWallet",
            Self::SetSdkConfig => "setSdkConfig",
            Self::RetrieveSession => "retrieveSession",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }
}

/// What the bridge asks the host to mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRequest {
    pub instance_id: u64,
    pub widget_url: String,
}

/// Addressable surface the widget is rendered into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceHandle {
    pub id: String,
}

/// The page that hosts the widget surface.
#[async_trait]
pub trait WidgetHost: Send + Sync {
    /// Origin of the hosting page, when there is one.
    fn origin(&self) -> Option<String>;
    /// Resolves once the page has finished loading.
    async fn wait_until_loaded(&self) -> Result<(), SdkError>;
    async fn mount(&self, request: &MountRequest) -> Result<SurfaceHandle, SdkError>;
    /// Establishes the cross-context connection, registers `callbacks` with
    /// the remote side and resolves once the widget reports ready.
    async fn connect(
        &self,
        surface: &SurfaceHandle,
        widget_url: &str,
        callbacks: Arc<dyn WidgetCallbacks>,
    ) -> Result<Arc<dyn WidgetChannel>, SdkError>;
    fn set_surface_height(&self, surface: &SurfaceHandle, height_px: u32);
    fn window_size(&self) -> WindowSize;
}

/// Connected peer. Every call resolves to the raw `{error, result}` reply.
#[async_trait]
pub trait WidgetChannel: Send + Sync {
    async fn call(&self, method: RemoteMethod, args: Vec<Value>) -> Result<Value, SdkError>;
}

/// Callbacks the widget may invoke on this side.
pub trait WidgetCallbacks: Send + Sync {
    fn set_height(&self, height_px: u32);
    fn get_window_size(&self) -> WindowSize;
    fn on_login(&self, address: String, email: Option<String>, reputation: Option<String>);
    fn on_logout(&self);
    fn on_active_wallet_changed(&self, address: String);
    fn on_error(&self, error: Value);
}

/// Where non-local methods end up.
#[async_trait]
pub trait RelayBackend: Send + Sync {
    fn name(&self) -> &'static str;
    async fn relay(&self, request: &JsonRpcRequest, ctx: &RequestContext)
        -> Result<Value, RpcError>;
}
