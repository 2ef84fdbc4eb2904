//! Session state and the network-scoped state it keys by network.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use serde_json::Value;

/// Point-in-time copy of one network's cache and nonce tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSnapshot {
    pub cache: BTreeMap<String, Value>,
    pub nonces: BTreeMap<String, u64>,
}

/// State that belongs to one network (`"<nodeUrl>:<chainId>"`): the
/// response cache and the pending-nonce tracker.
///
/// A request keeps the scope it started with for its whole traversal, so
/// late writes from a request that outlives a network switch land in the
/// network it was sent to.
#[derive(Debug)]
pub struct NetworkScope {
    key: String,
    cache: Mutex<BTreeMap<String, Value>>,
    nonces: Mutex<BTreeMap<String, u64>>,
    send_lock: tokio::sync::Mutex<()>,
}

impl NetworkScope {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            cache: Mutex::new(BTreeMap::new()),
            nonces: Mutex::new(BTreeMap::new()),
            send_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn cached(&self, cache_key: &str) -> Option<Value> {
        lock_or_recover!(self.cache).get(cache_key).cloned()
    }

    pub fn store(&self, cache_key: String, value: Value) {
        lock_or_recover!(self.cache).insert(cache_key, value);
    }

    /// Next nonce known for `address` (lower-cased hex).
    pub fn nonce(&self, address: &str) -> Option<u64> {
        lock_or_recover!(self.nonces).get(address).copied()
    }

    /// Records `next` unless a higher nonce is already tracked.
    pub fn advance_nonce(&self, address: &str, next: u64) {
        let mut nonces = lock_or_recover!(self.nonces);
        let slot = nonces.entry(address.to_owned()).or_insert(next);
        if *slot < next {
            *slot = next;
        }
    }

    /// Serializes transaction submission within this network.
    pub async fn lock_sends(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.send_lock.lock().await
    }

    pub fn snapshot(&self) -> ScopeSnapshot {
        ScopeSnapshot {
            cache: lock_or_recover!(self.cache).clone(),
            nonces: lock_or_recover!(self.nonces).clone(),
        }
    }
}

#[derive(Debug, Default)]
struct SessionInner {
    selected_address: Option<String>,
    network_version: Option<String>,
    scopes: HashMap<String, Arc<NetworkScope>>,
}

/// Selected address, network version and the per-network scopes.
///
/// This is the single place consumers read the selected address and the
/// network version from.
#[derive(Debug, Default)]
pub struct SessionState {
    inner: Mutex<SessionInner>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected_address(&self) -> Option<String> {
        lock_or_recover!(self.inner).selected_address.clone()
    }

    /// Only a successful account fetch may call this.
    pub(crate) fn set_selected_address(&self, address: Option<String>) {
        lock_or_recover!(self.inner).selected_address = address;
    }

    /// Logout from the widget side.
    pub(crate) fn clear_selected_address(&self) {
        lock_or_recover!(self.inner).selected_address = None;
    }

    pub fn network_version(&self) -> Option<String> {
        lock_or_recover!(self.inner).network_version.clone()
    }

    pub(crate) fn set_network_version(&self, version: String) {
        lock_or_recover!(self.inner).network_version = Some(version);
    }

    /// Scope registered under `key`, created empty on first use.
    pub(crate) fn scope_for(&self, key: &str) -> Arc<NetworkScope> {
        let mut g = lock_or_recover!(self.inner);
        Arc::clone(
            g.scopes
                .entry(key.to_owned())
                .or_insert_with(|| Arc::new(NetworkScope::new(key))),
        )
    }

    pub(crate) fn retain_scope(&self, scope: Arc<NetworkScope>) {
        lock_or_recover!(self.inner)
            .scopes
            .insert(scope.key().to_owned(), scope);
    }

    pub fn network_snapshot(&self, key: &str) -> Option<ScopeSnapshot> {
        lock_or_recover!(self.inner)
            .scopes
            .get(key)
            .map(|scope| scope.snapshot())
    }

    pub fn known_networks(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock_or_recover!(self.inner).scopes.keys().cloned().collect();
        keys.sort();
        keys
    }
}
