//! Error types for the session layer.

use std::net::IpAddr;

use bridgeward_transport::ConnectionId;

/// Errors that can occur while admitting or tracking a peer.
///
/// The first two are *authentication* errors: the listener answers them by
/// closing the socket with a policy-violation code.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The shared secret didn't match.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The peer connected from an address other than the allowed one.
    #[error("connection not allowed from {0}")]
    AddressNotAllowed(IpAddr),

    /// This connection already has a session.
    #[error("connection {0} already has an active session")]
    AlreadyConnected(ConnectionId),

    /// No session exists for the given connection.
    #[error("session not found for connection {0}")]
    NotFound(ConnectionId),
}
