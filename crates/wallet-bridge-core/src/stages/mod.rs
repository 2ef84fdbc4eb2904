//! Built-in pipeline stages.

mod cache;
mod default_id;
mod filters;
mod fixture;
pub mod gas;
mod nonce;
mod relay;
mod subscriptions;
mod wallet;

use std::sync::Arc;

use serde_json::Value;

pub use cache::CacheStage;
pub use default_id::DefaultIdStage;
pub use filters::FilterStage;
pub use fixture::FixtureStage;
pub use nonce::NonceStage;
pub use relay::{DirectRelay, RelayStage};
pub use subscriptions::SubscriptionStage;
pub use wallet::WalletStage;

use crate::bridge::Bridge;
use crate::context::SdkContext;
use crate::pipeline::{Pipeline, StageSlot};
use crate::ports::RelayBackend;

/// The standard stage layout: fixture, cache, subscriptions, filters,
/// nonce, default id, wallet, and `backend` as the terminal relay.
pub fn standard_pipeline(
    context: Arc<SdkContext>,
    bridge: Arc<Bridge>,
    backend: Arc<dyn RelayBackend>,
) -> Pipeline {
    let version = context.config().version.clone();
    let session = Arc::clone(context.session());
    Pipeline::builder(context)
        .stage(StageSlot::Fixture, Arc::new(FixtureStage::standard(&version)))
        .stage(StageSlot::Cache, Arc::new(CacheStage))
        .stage(StageSlot::Subscriptions, Arc::new(SubscriptionStage::new()))
        .stage(StageSlot::Filters, Arc::new(FilterStage::new()))
        .stage(StageSlot::Nonce, Arc::new(NonceStage))
        .stage(StageSlot::DefaultId, Arc::new(DefaultIdStage))
        .stage(
            StageSlot::Wallet,
            Arc::new(WalletStage::new(bridge, Arc::clone(&session))),
        )
        .terminal(Arc::new(RelayStage::new(backend, session)))
}

pub(crate) fn parse_quantity(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => {
            let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
            if digits.is_empty() {
                return Some(0);
            }
            u64::from_str_radix(digits, 16).ok()
        }
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

pub(crate) fn quantity(value: u64) -> Value {
    Value::String(format!("0x{value:x}"))
}
