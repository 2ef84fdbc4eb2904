use std::sync::{Arc, RwLock};

use crate::config::SdkConfig;
use crate::session::{NetworkScope, SessionState};

/// What one request sees for its whole traversal: the configuration and
/// the network scope that were active when it was dispatched.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub config: Arc<SdkConfig>,
    pub scope: Arc<NetworkScope>,
}

#[derive(Debug)]
pub(crate) struct ActiveNetwork {
    pub(crate) config: Arc<SdkConfig>,
    pub(crate) scope: Arc<NetworkScope>,
}

/// Per-instance state shared by the pipeline, the stages and the bridge.
///
/// The configuration and the active network scope sit behind one lock so
/// that they are always read, and replaced, as a pair.
#[derive(Debug)]
pub struct SdkContext {
    pub(crate) active: RwLock<ActiveNetwork>,
    session: Arc<SessionState>,
}

impl SdkContext {
    pub fn new(config: SdkConfig) -> Arc<Self> {
        let session = Arc::new(SessionState::new());
        let scope = session.scope_for(&config.network.network_key());
        Arc::new(Self {
            active: RwLock::new(ActiveNetwork {
                config: Arc::new(config),
                scope,
            }),
            session,
        })
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub fn config(&self) -> Arc<SdkConfig> {
        Arc::clone(&self.read_active().config)
    }

    pub fn request_context(&self) -> RequestContext {
        let active = self.read_active();
        RequestContext {
            config: Arc::clone(&active.config),
            scope: Arc::clone(&active.scope),
        }
    }

    pub fn set_default_email(&self, email: impl Into<String>) {
        let mut active = self.write_active();
        let mut next = (*active.config).clone();
        next.default_email = Some(email.into());
        active.config = Arc::new(next);
    }

    pub(crate) fn read_active(&self) -> std::sync::RwLockReadGuard<'_, ActiveNetwork> {
        match self.active.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("sdk context lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub(crate) fn write_active(&self) -> std::sync::RwLockWriteGuard<'_, ActiveNetwork> {
        match self.active.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("sdk context lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}
