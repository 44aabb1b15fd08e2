//! # Connection Tracking
//!
//! Shared, cross-connection mutable state: the mapping from a host channel
//! identity to its user. Each connection's packets are processed on that
//! connection's own event-loop thread, but registration and disconnect
//! cleanup touch this map from many threads, so insertion and removal are
//! mutually exclusive. Disconnects do their lookup-then-remove under one lock
//! acquisition so a freshly reused channel identity cannot be removed by a
//! stale cleanup.

use crate::protocol::version::{ClientVersion, ProtocolVersion};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// Opaque identity of a host channel. The host guarantees uniqueness among
/// live connections; identities may be reused after a disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u64);

/// Per-connection user state. The server version is fixed when the
/// connection is accepted; the client version arrives with the handshake.
#[derive(Debug)]
pub struct User {
    channel: ChannelId,
    server_version: ProtocolVersion,
    profile: Mutex<Profile>,
}

#[derive(Debug, Default)]
struct Profile {
    uuid: Option<Uuid>,
    name: Option<String>,
    client_version: ClientVersion,
}

impl User {
    pub fn new(channel: ChannelId, server_version: ProtocolVersion) -> Self {
        User {
            channel,
            server_version,
            profile: Mutex::new(Profile::default()),
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn server_version(&self) -> ProtocolVersion {
        self.server_version
    }

    pub fn client_version(&self) -> ClientVersion {
        self.profile.lock().unwrap_or_else(|e| e.into_inner()).client_version
    }

    /// Set once the handshake has been observed.
    pub fn set_client_version(&self, version: ClientVersion) {
        self.profile.lock().unwrap_or_else(|e| e.into_inner()).client_version = version;
    }

    pub fn uuid(&self) -> Option<Uuid> {
        self.profile.lock().unwrap_or_else(|e| e.into_inner()).uuid
    }

    pub fn name(&self) -> Option<String> {
        self.profile.lock().unwrap_or_else(|e| e.into_inner()).name.clone()
    }

    /// Set at login.
    pub fn set_profile(&self, uuid: Uuid, name: impl Into<String>) {
        let mut profile = self.profile.lock().unwrap_or_else(|e| e.into_inner());
        profile.uuid = Some(uuid);
        profile.name = Some(name.into());
    }

    /// Human-readable identity for error attribution in logs.
    pub fn display_name(&self) -> String {
        let profile = self.profile.lock().unwrap_or_else(|e| e.into_inner());
        match &profile.name {
            Some(name) => name.clone(),
            None => format!("channel-{}", self.channel.0),
        }
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// The process-wide channel-to-user map.
#[derive(Default)]
pub struct ConnectionMap {
    users: Mutex<HashMap<ChannelId, Arc<User>>>,
}

impl ConnectionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection. Returns the previous user when the channel
    /// identity was still registered, which indicates a missed disconnect.
    pub fn insert(&self, user: Arc<User>) -> Option<Arc<User>> {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        users.insert(user.channel(), user)
    }

    pub fn get(&self, channel: ChannelId) -> Option<Arc<User>> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        users.get(&channel).cloned()
    }

    /// Lookup and removal under one lock acquisition, so a concurrent
    /// re-registration of the same channel identity cannot be removed by a
    /// stale disconnect.
    pub fn remove(&self, channel: ChannelId) -> Option<Arc<User>> {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let removed = users.remove(&channel);
        if let Some(user) = &removed {
            debug!(channel = channel.0, user = %user, "connection removed");
        }
        removed
    }

    /// Remove only if the registered user is still the given instance.
    /// Disconnect cleanup uses this to avoid racing a reused identity.
    pub fn remove_if_same(&self, channel: ChannelId, expected: &Arc<User>) -> bool {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        match users.get(&channel) {
            Some(current) if Arc::ptr_eq(current, expected) => {
                users.remove(&channel);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.users.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
