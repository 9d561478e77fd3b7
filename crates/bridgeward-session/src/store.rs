//! The session store and the server-name directory.
//!
//! # Concurrency note
//!
//! Neither type here is thread-safe by itself: they use plain collections.
//! The bridge owns one of each behind an async mutex, and all mutation
//! happens from the listener's sequential dispatch. Keeping them simple
//! here avoids hidden locking overhead.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use bridgeward_protocol::{ALL_SERVERS, ServerLookup, is_reserved_server};
use bridgeward_transport::{Connection, ConnectionId};

use crate::{PeerHandle, Session, SessionError};

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// All authenticated peers, keyed by connection.
///
/// ## Single-peer default
///
/// The bridge is designed around one authoritative peer at a time.
/// [`primary`](Self::primary) returns the session with the lowest
/// connection id (the oldest still connected), and every outbound command
/// goes there. The map can hold more than one session so a reconnecting
/// peer doesn't have to wait for the old socket to be torn down, but
/// nothing fans out to several peers.
pub struct SessionStore<C> {
    sessions: BTreeMap<ConnectionId, Session<C>>,
}

impl<C: Connection> SessionStore<C> {
    pub fn new() -> Self {
        Self {
            sessions: BTreeMap::new(),
        }
    }

    /// Registers a freshly authenticated peer.
    ///
    /// # Errors
    /// Returns [`SessionError::AlreadyConnected`] if this connection
    /// already has a session.
    pub fn create(
        &mut self,
        connection: Arc<C>,
        servers: Vec<String>,
    ) -> Result<&Session<C>, SessionError> {
        let id = connection.id();
        if self.sessions.contains_key(&id) {
            return Err(SessionError::AlreadyConnected(id));
        }

        let session = Session::new(connection, servers);
        tracing::info!(conn_id = %id, servers = ?session.servers, "session created");
        Ok(&*self.sessions.entry(id).or_insert(session))
    }

    /// Removes a session. Returns it if it existed.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Session<C>> {
        let removed = self.sessions.remove(&id);
        if removed.is_some() {
            tracing::info!(conn_id = %id, "session removed");
        }
        removed
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Session<C>> {
        self.sessions.get(&id)
    }

    /// The peer that receives outbound commands.
    pub fn primary(&self) -> Option<&Session<C>> {
        self.sessions.values().next()
    }

    /// A send handle for the primary peer.
    pub fn primary_handle(&self) -> Option<PeerHandle<C>> {
        self.primary().map(Session::handle)
    }

    /// Every server name advertised by any session, deduplicated.
    pub fn advertised_servers(&self) -> BTreeSet<String> {
        self.sessions
            .values()
            .flat_map(|s| s.servers.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<C: Connection> Default for SessionStore<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connection> ServerLookup for SessionStore<C> {
    fn is_advertised(&self, server: &str) -> bool {
        self.sessions.values().any(|s| s.advertises(server))
    }
}

// ---------------------------------------------------------------------------
// ServerDirectory
// ---------------------------------------------------------------------------

/// The global set of known server names.
///
/// Filled when a peer authenticates (its list plus `all`), and emptied
/// when the last peer goes away.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerDirectory {
    names: BTreeSet<String>,
}

impl ServerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a peer's advertised servers plus `all`.
    pub fn merge<I, S>(&mut self, servers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names.extend(servers.into_iter().map(Into::into));
        self.names.insert(ALL_SERVERS.to_string());
    }

    /// Replaces the directory with what the remaining sessions advertise.
    ///
    /// With no sessions left this empties the directory, including `all`.
    pub fn rebuild_from<C: Connection>(&mut self, store: &SessionStore<C>) {
        self.names.clear();
        if !store.is_empty() {
            self.merge(store.advertised_servers());
        }
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Known names other than `all`, `bungeecord`, and `velocity`.
    pub fn non_reserved(&self) -> Vec<&str> {
        self.names()
            .filter(|name| !is_reserved_server(name))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use bridgeward_transport::TransportError;

    /// A connection that records what was sent to it.
    struct MockConn {
        id: ConnectionId,
        sent: std::sync::Mutex<Vec<String>>,
        closed: bool,
    }

    impl MockConn {
        fn new(id: u64) -> Arc<Self> {
            Arc::new(Self {
                id: ConnectionId::new(id),
                sent: std::sync::Mutex::new(Vec::new()),
                closed: false,
            })
        }

        fn closed(id: u64) -> Arc<Self> {
            Arc::new(Self {
                id: ConnectionId::new(id),
                sent: std::sync::Mutex::new(Vec::new()),
                closed: true,
            })
        }
    }

    impl Connection for MockConn {
        async fn send(&self, text: &str) -> Result<(), TransportError> {
            if self.closed {
                return Err(TransportError::ConnectionClosed("gone".into()));
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
            Ok(None)
        }

        async fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn close_with(&self, _code: u16, _reason: &str) -> Result<(), TransportError> {
            Ok(())
        }

        fn id(&self) -> ConnectionId {
            self.id
        }

        fn peer_addr(&self) -> SocketAddr {
            "127.0.0.1:50000".parse().unwrap()
        }
    }

    fn servers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    // =====================================================================
    // SessionStore
    // =====================================================================

    #[test]
    fn test_create_new_connection_returns_session() {
        let mut store = SessionStore::new();
        let session = store.create(MockConn::new(1), servers(&["lobby"])).unwrap();
        assert_eq!(session.id, ConnectionId::new(1));
        assert_eq!(session.servers, vec!["lobby"]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_create_same_connection_twice_returns_error() {
        let mut store = SessionStore::new();
        let conn = MockConn::new(1);
        store.create(Arc::clone(&conn), vec![]).unwrap();

        let err = store.create(conn, vec![]).unwrap_err();
        assert!(matches!(err, SessionError::AlreadyConnected(id) if id == ConnectionId::new(1)));
    }

    #[test]
    fn test_primary_is_lowest_connection_id() {
        let mut store = SessionStore::new();
        store.create(MockConn::new(7), vec![]).unwrap();
        store.create(MockConn::new(3), vec![]).unwrap();
        assert_eq!(store.primary().map(|s| s.id), Some(ConnectionId::new(3)));
    }

    #[test]
    fn test_primary_none_when_empty() {
        let store: SessionStore<MockConn> = SessionStore::new();
        assert!(store.primary().is_none());
        assert!(store.primary_handle().is_none());
    }

    #[test]
    fn test_remove_returns_session_once() {
        let mut store = SessionStore::new();
        store.create(MockConn::new(1), vec![]).unwrap();
        assert!(store.remove(ConnectionId::new(1)).is_some());
        assert!(store.remove(ConnectionId::new(1)).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_server_lookup_checks_every_session() {
        let mut store = SessionStore::new();
        store.create(MockConn::new(1), servers(&["lobby"])).unwrap();
        store.create(MockConn::new(2), servers(&["survival"])).unwrap();
        assert!(store.is_advertised("lobby"));
        assert!(store.is_advertised("survival"));
        assert!(!store.is_advertised("creative"));
    }

    #[tokio::test]
    async fn test_primary_handle_send_text_reaches_connection() {
        let mut store = SessionStore::new();
        let conn = MockConn::new(1);
        store.create(Arc::clone(&conn), vec![]).unwrap();

        let handle = store.primary_handle().unwrap();
        assert!(handle.send_text(r#"{"action":"x"}"#).await);
        assert_eq!(conn.sent.lock().unwrap().as_slice(), [r#"{"action":"x"}"#]);
    }

    #[tokio::test]
    async fn test_send_text_on_closed_connection_returns_false() {
        let handle = PeerHandle::new(MockConn::closed(1));
        assert!(!handle.send_text("hello").await);
    }

    // =====================================================================
    // ServerDirectory
    // =====================================================================

    #[test]
    fn test_merge_adds_all() {
        let mut dir = ServerDirectory::new();
        dir.merge(["lobby"]);
        let names: Vec<_> = dir.names().collect();
        assert_eq!(names, vec!["all", "lobby"]);
    }

    #[test]
    fn test_non_reserved_filters_proxies_and_all() {
        let mut dir = ServerDirectory::new();
        dir.merge(["lobby", "velocity"]);
        assert_eq!(dir.non_reserved(), vec!["lobby"]);
    }

    #[test]
    fn test_rebuild_from_empty_store_clears_everything() {
        let mut dir = ServerDirectory::new();
        dir.merge(["lobby"]);
        let store: SessionStore<MockConn> = SessionStore::new();
        dir.rebuild_from(&store);
        assert!(dir.is_empty());
    }

    #[test]
    fn test_rebuild_from_keeps_remaining_peers_servers() {
        let mut store = SessionStore::new();
        store.create(MockConn::new(1), servers(&["lobby"])).unwrap();
        store.create(MockConn::new(2), servers(&["survival"])).unwrap();

        let mut dir = ServerDirectory::new();
        dir.merge(["lobby", "survival"]);

        store.remove(ConnectionId::new(2));
        dir.rebuild_from(&store);
        assert!(dir.contains("lobby"));
        assert!(dir.contains("all"));
        assert!(!dir.contains("survival"));
    }
}
