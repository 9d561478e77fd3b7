//! Session types: the data structures that represent an admitted peer.
//!
//! A "session" is the bridge's record of one authenticated game-side
//! peer (usually a proxy plugin fronting several game servers). It tracks:
//! - WHICH connection it is (`ConnectionId`)
//! - HOW to reach it (the transport handle)
//! - WHAT servers it fronts (the advertised server list)
//! - WHEN it authenticated

use std::sync::Arc;
use std::time::Instant;

use bridgeward_transport::{Connection, ConnectionId, TransportError};

// ---------------------------------------------------------------------------
// PeerState
// ---------------------------------------------------------------------------

/// Where a connection is in its lifecycle.
///
/// ```text
///   Connected ──(address ok)──→ AuthPending ──(authenticate ok)──→ Authenticated
///       │                           │                                  │
///       └──(address rejected)──┐    ├──(deadline / bad password)──┐    │
///                              ▼    ▼                             ▼    ▼
///                                         Closed
/// ```
///
/// `Closed` is terminal: the listener removes the session (if any) and
/// stops reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Socket open, address not yet checked.
    Connected,
    /// Waiting for `authenticate`; everything else is dropped.
    AuthPending,
    /// Admitted. Every registered action is dispatched.
    Authenticated,
    /// Done.
    Closed,
}

impl PeerState {
    /// Returns `true` if a frame with this action should be dispatched.
    pub fn accepts(&self, action: &str, auth_action: &str) -> bool {
        match self {
            Self::AuthPending => action == auth_action,
            Self::Authenticated => true,
            Self::Connected | Self::Closed => false,
        }
    }
}

// ---------------------------------------------------------------------------
// PeerHandle
// ---------------------------------------------------------------------------

/// A cheap, clonable handle for writing to one peer.
///
/// Handed out by the session store so callers can send without holding
/// the store's lock across network I/O.
pub struct PeerHandle<C> {
    connection: Arc<C>,
}

impl<C> Clone for PeerHandle<C> {
    fn clone(&self) -> Self {
        Self {
            connection: Arc::clone(&self.connection),
        }
    }
}

impl<C: Connection> PeerHandle<C> {
    pub fn new(connection: Arc<C>) -> Self {
        Self { connection }
    }

    pub fn id(&self) -> ConnectionId {
        self.connection.id()
    }

    /// Writes one text frame. Never fails loudly: a closed peer is logged
    /// as a warning, any other transport error as an error, and both
    /// return `false`.
    pub async fn send_text(&self, text: &str) -> bool {
        let conn_id = self.connection.id();
        match self.connection.send(text).await {
            Ok(()) => {
                tracing::debug!(%conn_id, "message sent to peer");
                true
            }
            Err(TransportError::ConnectionClosed(reason)) => {
                tracing::warn!(%conn_id, %reason, "message not sent: connection closed");
                false
            }
            Err(e) => {
                tracing::error!(%conn_id, error = %e, "message not sent");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One authenticated peer.
pub struct Session<C> {
    /// Which connection this session belongs to.
    pub id: ConnectionId,

    /// The transport handle. Shared with the listener task reading from it.
    pub connection: Arc<C>,

    /// Server names the peer advertised in its `authenticate` frame.
    pub servers: Vec<String>,

    /// When authentication succeeded.
    pub created_at: Instant,
}

impl<C: Connection> Session<C> {
    pub fn new(connection: Arc<C>, servers: Vec<String>) -> Self {
        Self {
            id: connection.id(),
            connection,
            servers,
            created_at: Instant::now(),
        }
    }

    pub fn handle(&self) -> PeerHandle<C> {
        PeerHandle::new(Arc::clone(&self.connection))
    }

    pub fn advertises(&self, server: &str) -> bool {
        self.servers.iter().any(|s| s == server)
    }
}

impl<C> std::fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("servers", &self.servers)
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_state_auth_pending_accepts_only_authenticate() {
        let state = PeerState::AuthPending;
        assert!(state.accepts("authenticate", "authenticate"));
        assert!(!state.accepts("player-status-check", "authenticate"));
    }

    #[test]
    fn test_peer_state_authenticated_accepts_everything() {
        assert!(PeerState::Authenticated.accepts("player-status-check", "authenticate"));
    }

    #[test]
    fn test_peer_state_closed_accepts_nothing() {
        assert!(!PeerState::Closed.accepts("authenticate", "authenticate"));
    }
}
