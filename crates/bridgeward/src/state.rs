//! State shared by the listener tasks and the outbound API.

use bridgeward_protocol::JsonCodec;
use bridgeward_session::{PlayerDirectory, ServerDirectory, SessionStore};
use bridgeward_transport::WebSocketConnection;
use tokio::sync::Mutex;

use crate::{BridgeConfig, BridgeError};

/// One bridge's worth of state.
///
/// Created by the server builder and shared through `Arc`. The session
/// store and the server directory are only touched between awaits, behind
/// async mutexes. The player projections lock internally, because their
/// sweeper threads write to them as well.
pub struct BridgeState {
    pub(crate) config: BridgeConfig,
    pub(crate) sessions: Mutex<SessionStore<WebSocketConnection>>,
    pub(crate) servers: Mutex<ServerDirectory>,
    pub(crate) players: PlayerDirectory,
    pub(crate) codec: JsonCodec,
}

impl BridgeState {
    /// # Errors
    /// [`BridgeError::Expiry`] if the player cache TTL is zero.
    pub fn new(config: BridgeConfig) -> Result<Self, BridgeError> {
        let players = PlayerDirectory::new(config.player_cache_ttl)?;
        Ok(Self {
            config,
            sessions: Mutex::new(SessionStore::new()),
            servers: Mutex::new(ServerDirectory::new()),
            players,
            codec: JsonCodec,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The player projections filled by inbound replies.
    pub fn players(&self) -> &PlayerDirectory {
        &self.players
    }

    /// Every known server name, `all` included, sorted.
    pub async fn known_servers(&self) -> Vec<String> {
        self.servers
            .lock()
            .await
            .names()
            .map(str::to_string)
            .collect()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Stops the projections' sweeper threads.
    pub fn shutdown(&self) {
        self.players.shutdown();
    }
}

impl std::fmt::Debug for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeState")
            .field("players", &self.players)
            .finish_non_exhaustive()
    }
}
