/// Acquire mutex lock, recovering from poisoned state if necessary.
macro_rules! lock_or_recover {
    ($mutex:expr) => {
        match $mutex.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    };
}

pub mod bridge;
pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod networks;
pub mod pipeline;
pub mod ports;
pub mod provider;
pub mod session;
pub mod stages;
mod switch;

#[cfg(test)]
mod testing;

pub use bridge::{Bridge, BridgeSettings, EventHandlers, LoginEvent, SessionBootstrap, WidgetSession};
pub use config::{
    validate_params, validate_secure_origin, DecentralizedParams, RelayChoice, Scope, SdkConfig,
    SdkOptions, VerifiedParams,
};
pub use context::{RequestContext, SdkContext};
pub use domain::{
    BtcSignTxRequest, BtcSignedTx, JsonRpcRequest, JsonRpcResponse, MessageParams,
    MessageStandard, NetworkDescriptor, NetworkInput, NodeProtocol, WidgetReply, WindowSize,
};
pub use error::{RpcError, SdkError};
pub use networks::resolve_network;
pub use pipeline::{Next, Pipeline, Stage, StageResult, StageSlot, TerminalStage};
pub use ports::{
    MountRequest, RelayBackend, RemoteMethod, SurfaceHandle, WidgetCallbacks, WidgetChannel,
    WidgetHost,
};
pub use provider::LegacyProvider;
pub use session::{NetworkScope, ScopeSnapshot, SessionState};
