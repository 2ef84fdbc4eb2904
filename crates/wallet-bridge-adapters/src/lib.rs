pub mod config;
pub mod decentralized;
pub mod http_channel;
pub mod memory;
pub mod verified;

pub use config::AdapterConfig;
pub use decentralized::DecentralizedRelay;
pub use http_channel::{HeadlessWidgetHost, HttpWidgetChannel};
pub use memory::{InMemoryHost, InMemoryWidget, RelayHandler};
pub use verified::{ProofError, VerifiedRelay};
