//! Open sockets: outbound channel and game membership of every connection.

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::{dto::ws::ServerMessage, state::identity::ConnectionId};

/// Part a connection plays in its game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Player,
}

/// Game a connection belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub code: String,
    pub role: Role,
}

struct ClientConnection {
    tx: mpsc::UnboundedSender<ServerMessage>,
    membership: Option<Membership>,
}

/// Registry of open sockets.
#[derive(Default)]
pub struct ConnectionHub {
    connections: DashMap<ConnectionId, ClientConnection>,
}

impl ConnectionHub {
    /// Empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a handle for a new socket and return the receiving end of its outbound queue.
    pub fn register(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ConnectionId::new();
        self.connections.insert(
            id,
            ClientConnection {
                tx,
                membership: None,
            },
        );
        (id, rx)
    }

    /// Queue `message` for `to`. Returns `false` when the socket is gone.
    pub fn send(&self, to: ConnectionId, message: ServerMessage) -> bool {
        self.connections
            .get(&to)
            .is_some_and(|connection| connection.tx.send(message).is_ok())
    }

    /// Record which game `connection` now belongs to, returning the previous membership.
    pub fn attach(&self, connection: ConnectionId, membership: Membership) -> Option<Membership> {
        self.connections
            .get_mut(&connection)
            .and_then(|mut entry| entry.membership.replace(membership))
    }

    /// Game `connection` belongs to.
    pub fn membership(&self, connection: ConnectionId) -> Option<Membership> {
        self.connections
            .get(&connection)
            .and_then(|entry| entry.membership.clone())
    }

    /// Whether `connection` is still registered.
    pub fn is_open(&self, connection: ConnectionId) -> bool {
        self.connections.contains_key(&connection)
    }

    /// Forget a closed socket, returning the game it belonged to.
    pub fn unregister(&self, connection: ConnectionId) -> Option<Membership> {
        self.connections
            .remove(&connection)
            .and_then(|(_, entry)| entry.membership)
    }

    /// Number of open sockets.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no socket is open.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_reaches_registered_socket() {
        let hub = ConnectionHub::new();
        let (id, mut rx) = hub.register();
        assert!(hub.send(id, ServerMessage::HostReconnected));
        assert!(matches!(rx.try_recv(), Ok(ServerMessage::HostReconnected)));
    }

    #[test]
    fn send_to_closed_socket_reports_failure() {
        let hub = ConnectionHub::new();
        let (id, rx) = hub.register();
        drop(rx);
        assert!(!hub.send(id, ServerMessage::HostReconnected));
        assert!(!hub.send(ConnectionId::new(), ServerMessage::HostReconnected));
    }

    #[test]
    fn attach_replaces_membership() {
        let hub = ConnectionHub::new();
        let (id, _rx) = hub.register();
        let host = Membership {
            code: "ABC234".into(),
            role: Role::Host,
        };
        assert_eq!(hub.attach(id, host.clone()), None);
        let player = Membership {
            code: "XYZ789".into(),
            role: Role::Player,
        };
        assert_eq!(hub.attach(id, player.clone()), Some(host));
        assert_eq!(hub.unregister(id), Some(player));
        assert!(hub.is_empty());
    }
}
