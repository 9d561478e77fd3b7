//! Transport layer for Bridgeward.
//!
//! Game servers connect to the bridge over a WebSocket, normally wrapped
//! in TLS with a self-signed certificate the bridge generates on first
//! run. This crate owns everything below the JSON layer:
//!
//! - [`WebSocketTransport`] — binds the listener and yields [`Incoming`]
//!   sockets. The TLS and WebSocket handshakes happen in
//!   [`Incoming::upgrade`], so a slow client can't stall the accept loop.
//! - [`Connection`] — the trait the rest of the bridge talks to. Text
//!   frames out, raw bytes in, and a close that carries a status code.
//! - [`tls`] — certificate generation and loading.

#![allow(async_fn_in_trait)]

mod error;
pub mod tls;
mod websocket;

pub use error::TransportError;
pub use tls::TlsMode;
pub use websocket::{Incoming, WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::net::SocketAddr;

/// WebSocket close code for policy violations (RFC 6455 §7.4.1).
///
/// The bridge uses it for every rejection it initiates: wrong source
/// address, authentication timeout, bad credentials, duplicate peer.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A single connection to a game server.
///
/// Sending and receiving are independent: a task blocked in
/// [`recv`](Self::recv) does not hold up [`send`](Self::send) from
/// another task.
pub trait Connection: Send + Sync + 'static {
    /// Sends one text frame to the remote peer.
    async fn send(&self, text: &str) -> Result<(), TransportError>;

    /// Receives the next data frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError>;

    /// Closes the connection with a normal closure.
    async fn close(&self) -> Result<(), TransportError>;

    /// Closes the connection with an explicit status code and reason.
    async fn close_with(
        &self,
        code: u16,
        reason: &str,
    ) -> Result<(), TransportError>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Returns the remote socket address.
    fn peer_addr(&self) -> SocketAddr;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_orders_by_value() {
        use std::collections::BTreeSet;
        let ids: BTreeSet<_> =
            [3, 1, 2].into_iter().map(ConnectionId::new).collect();
        let first = ids.iter().next().copied();
        assert_eq!(first, Some(ConnectionId::new(1)));
    }
}
