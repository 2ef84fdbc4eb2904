//! Network switching.

use std::sync::Arc;

use crate::context::SdkContext;
use crate::domain::{NetworkDescriptor, NetworkInput};
use crate::error::SdkError;
use crate::networks::resolve_network;

impl SdkContext {
    /// Moves the instance to another network.
    ///
    /// The outgoing network's cache and nonce tracker stay registered under
    /// its key; the target's are restored when it was visited before and
    /// start empty otherwise. The new scope and the new descriptor are
    /// installed under one write lock, descriptor last, so a request sees
    /// either the old pair or the new pair.
    ///
    /// Requests already in flight keep their old scope and complete against
    /// it. Whether their responses should be discarded is left to the caller.
    pub fn switch_network(
        &self,
        next: &NetworkInput,
        gas_relay: bool,
    ) -> Result<NetworkDescriptor, SdkError> {
        let descriptor = resolve_network(next, gas_relay, None)?;
        let next_key = descriptor.network_key();

        let mut active = self.write_active();
        let outgoing_key = active.scope.key().to_owned();

        self.session().retain_scope(Arc::clone(&active.scope));
        active.scope = self.session().scope_for(&next_key);

        let mut config = (*active.config).clone();
        config.network = descriptor.clone();
        active.config = Arc::new(config);
        drop(active);

        tracing::info!(from = %outgoing_key, to = %next_key, "switched network");
        Ok(descriptor)
    }
}
