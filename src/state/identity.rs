//! Bidirectional mapping between ephemeral connection handles and durable player identities.

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Handle of a single transport connection. A new one is issued for every socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Issue a fresh random handle.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Rebuild a handle from its stored form.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Underlying identifier.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Stable player identity within one session: the trimmed, case-folded display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    /// Derive the identity for a display name.
    pub fn from_name(name: &str) -> Self {
        Self(name.trim().to_lowercase())
    }

    /// Case-folded key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connection-to-player bindings for one session.
///
/// Both directions are updated together so a handle maps to at most one player and a player
/// to at most one handle.
#[derive(Debug, Default, Clone)]
pub struct IdentityMap {
    by_connection: HashMap<ConnectionId, PlayerId>,
    by_player: HashMap<PlayerId, ConnectionId>,
}

impl IdentityMap {
    /// Bind `player` to `connection`, dropping whatever either side was bound to before.
    ///
    /// Returns the handle the player was previously reachable on, if it differs.
    pub fn bind(&mut self, player: PlayerId, connection: ConnectionId) -> Option<ConnectionId> {
        if let Some(other) = self.by_connection.remove(&connection) {
            self.by_player.remove(&other);
        }
        let previous = self.by_player.insert(player.clone(), connection);
        if let Some(old) = previous {
            self.by_connection.remove(&old);
        }
        self.by_connection.insert(connection, player);
        previous.filter(|old| *old != connection)
    }

    /// Release a handle. Stale handles that were already rebound are a no-op.
    pub fn release(&mut self, connection: ConnectionId) -> Option<PlayerId> {
        let player = self.by_connection.remove(&connection)?;
        self.by_player.remove(&player);
        Some(player)
    }

    /// Drop every binding of `player`.
    pub fn forget(&mut self, player: &PlayerId) -> Option<ConnectionId> {
        let connection = self.by_player.remove(player)?;
        self.by_connection.remove(&connection);
        Some(connection)
    }

    /// Player currently reachable on `connection`.
    pub fn player_for(&self, connection: ConnectionId) -> Option<&PlayerId> {
        self.by_connection.get(&connection)
    }

    /// Handle currently bound to `player`.
    pub fn connection_for(&self, player: &PlayerId) -> Option<ConnectionId> {
        self.by_player.get(player).copied()
    }

    /// Number of bound players.
    pub fn len(&self) -> usize {
        self.by_player.len()
    }
}
