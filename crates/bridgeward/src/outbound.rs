//! The outbound command API: everything the bridge sends to the peer.
//!
//! Two kinds of call live here:
//!
//! - **Fire-and-forget** (`send_*_message`, `dispatch_command`,
//!   `command_executed`): the result only says whether the frame was
//!   written.
//! - **Fire-and-poll** (`fetch_*`): send a query, sleep for the response
//!   timeout, then read the player projections the listener fills from the
//!   peer's replies.
//!
//! # Fire-and-poll has no correlation
//!
//! The wire format carries no request id. A caller can't tell "no reply
//! yet" from "no reply ever", and two overlapping queries about the same
//! player both read whatever reply landed last. Queries about different
//! players don't interfere.
//!
//! # Single peer
//!
//! Every frame goes to the primary session (see
//! [`SessionStore::primary`](bridgeward_session::SessionStore::primary)).
//! With no authenticated peer, or no known server, every call returns
//! `false`/`None` without sending.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bridgeward_protocol::{
    ALL_SERVERS, ActionSchema, Codec, CommandExecuted, DispatchCommand, MessageType, PlayerKey,
    PlayerServerCheck, PlayerStatusCheck, SendGlobalMessage, SendPlayerMessage,
    SendServerMessage, frame,
};
use bridgeward_scheduler::UserId;
use tracing::{debug, error, warn};

use crate::{AccountLinks, BridgeError, BridgeState};

/// The executor name used when the bridge itself issues a command.
pub const BRIDGE_EXECUTOR: &str = "bridgeward";

/// Who a player query is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerRef {
    Username(String),
    Uuid(String),
    /// A chat-platform user, resolved to their linked game UUID.
    Account(UserId),
}

impl PlayerRef {
    pub fn username(name: impl Into<String>) -> Self {
        Self::Username(name.into())
    }

    pub fn uuid(uuid: impl Into<String>) -> Self {
        Self::Uuid(uuid.into())
    }
}

/// Cheap to clone; every clone talks to the same bridge.
#[derive(Clone)]
pub struct Outbound {
    bridge: Arc<BridgeState>,
    links: Option<Arc<dyn AccountLinks>>,
}

impl Outbound {
    pub fn new(bridge: Arc<BridgeState>, links: Option<Arc<dyn AccountLinks>>) -> Self {
        Self { bridge, links }
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    /// Encodes `payload` and writes it to the primary peer.
    ///
    /// Returns `false` when no peer is authenticated or the write fails;
    /// both are logged, neither is an error.
    pub async fn send<S: ActionSchema>(&self, payload: &S) -> bool {
        let handle = self.bridge.sessions.lock().await.primary_handle();
        let Some(handle) = handle else {
            warn!(action = S::ACTION, "no authenticated peer; message not sent");
            return false;
        };

        let text = match self.bridge.codec.encode(&frame(payload)) {
            Ok(text) => text,
            Err(e) => {
                error!(action = S::ACTION, error = %e, "failed to encode message");
                return false;
            }
        };
        debug!(action = S::ACTION, "sending to peer");
        handle.send_text(&text).await
    }

    /// `false` (and a debug line) when no server is known.
    async fn servers_available(&self) -> bool {
        if self.bridge.servers.lock().await.is_empty() {
            debug!("no game servers available");
            return false;
        }
        true
    }

    fn response_timeout(&self, timeout: Option<Duration>) -> Duration {
        timeout.unwrap_or(self.bridge.config.response_timeout)
    }

    /// Turns a [`PlayerRef`] into a wire identifier.
    async fn resolve(&self, player: &PlayerRef) -> Option<PlayerKey> {
        match player {
            PlayerRef::Username(name) => Some(PlayerKey::Username(name.clone())),
            PlayerRef::Uuid(uuid) => Some(PlayerKey::Uuid(uuid.clone())),
            PlayerRef::Account(user) => {
                let Some(links) = &self.links else {
                    warn!(%user, "no account links configured");
                    return None;
                };
                let uuid = links.player_uuid_for(*user).await;
                if uuid.is_none() {
                    debug!(%user, "no game account linked");
                }
                uuid.map(PlayerKey::Uuid)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Fire-and-poll
    // -----------------------------------------------------------------------

    /// Is the player online?
    ///
    /// A cached "online" answers at once. Otherwise a
    /// `player-status-check` goes out and the cache is read again after
    /// `timeout` (default: the configured response timeout).
    pub async fn fetch_player_status(&self, player: &PlayerRef, timeout: Option<Duration>) -> bool {
        if !self.servers_available().await {
            return false;
        }
        let Some(key) = self.resolve(player).await else {
            return false;
        };
        self.status_of(&key, timeout).await
    }

    async fn status_of(&self, key: &PlayerKey, timeout: Option<Duration>) -> bool {
        let players = &self.bridge.players;
        if players.is_online(key.as_str()) {
            debug!(player = %key, "online (cached)");
            return true;
        }

        if !self.send(&PlayerStatusCheck::query(key.clone())).await {
            return false;
        }
        tokio::time::sleep(self.response_timeout(timeout)).await;

        let online = players.is_online(key.as_str());
        debug!(player = %key, online, "status after wait");
        online
    }

    /// The UUID of an online player.
    pub async fn fetch_player_uuid(&self, username: &str, timeout: Option<Duration>) -> Option<String> {
        if let Some(uuid) = self.bridge.players.uuid_of(username) {
            return Some(uuid);
        }
        let player = PlayerRef::username(username);
        if !self.fetch_player_status(&player, timeout).await {
            return None;
        }
        self.bridge.players.uuid_of(username)
    }

    /// The server an online player is on.
    ///
    /// Tries, in order: the server cache; a status check (`None` if
    /// offline); the server cache again; the only known server, when
    /// exactly one non-reserved server is advertised; an explicit
    /// `player-server-check`.
    pub async fn fetch_player_server(&self, player: &PlayerRef, timeout: Option<Duration>) -> Option<String> {
        if !self.servers_available().await {
            return None;
        }
        let key = self.resolve(player).await?;
        let players = &self.bridge.players;

        if let Some(server) = players.server_of(key.as_str()) {
            return Some(server);
        }
        if !self.status_of(&key, timeout).await {
            debug!(player = %key, "offline; no server");
            return None;
        }
        if let Some(server) = players.server_of(key.as_str()) {
            return Some(server);
        }

        let only = {
            let servers = self.bridge.servers.lock().await;
            match servers.non_reserved().as_slice() {
                [only] => Some(only.to_string()),
                _ => None,
            }
        };
        if only.is_some() {
            return only;
        }

        if !self.send(&PlayerServerCheck::query(key.clone())).await {
            return None;
        }
        tokio::time::sleep(self.response_timeout(timeout)).await;
        players.server_of(key.as_str())
    }

    // -----------------------------------------------------------------------
    // Fire-and-forget
    // -----------------------------------------------------------------------

    /// Messages one player, but only if they are online.
    pub async fn send_player_message(
        &self,
        player: &PlayerRef,
        message_type: MessageType,
        message: &str,
        timeout: Option<Duration>,
    ) -> bool {
        if !self.servers_available().await {
            return false;
        }
        let Some(key) = self.resolve(player).await else {
            return false;
        };
        if !self.status_of(&key, timeout).await {
            debug!(player = %key, "offline; message not sent");
            return false;
        }
        self.send(&SendPlayerMessage::to_player(key, message_type, message))
            .await
    }

    /// Broadcasts to every player on every server.
    pub async fn send_global_message(&self, message_type: MessageType, message: &str) -> bool {
        if !self.servers_available().await {
            return false;
        }
        self.send(&SendGlobalMessage {
            message_type,
            message: message.to_string(),
        })
        .await
    }

    /// Messages every player on one server.
    ///
    /// # Errors
    /// [`BridgeError::Protocol`] when `server` is neither reserved nor
    /// advertised by a peer. Nothing is sent.
    pub async fn send_server_message(
        &self,
        server: &str,
        message_type: MessageType,
        message: &str,
    ) -> Result<bool, BridgeError> {
        let payload = SendServerMessage {
            server: server.to_string(),
            message_type,
            message: message.to_string(),
        };
        self.send_validated(&payload).await
    }

    /// Runs console commands on one server (or `all`).
    ///
    /// # Errors
    /// [`BridgeError::Protocol`] for an unknown server. Nothing is sent.
    pub async fn dispatch_command(&self, server: &str, commands: Vec<String>) -> Result<bool, BridgeError> {
        let payload = DispatchCommand {
            server: server.to_string(),
            commands,
        };
        self.send_validated(&payload).await
    }

    /// Tells every server that a moderation command ran on the chat side.
    pub async fn command_executed(&self, command_type: &str, args: BTreeMap<String, String>) -> bool {
        if !self.servers_available().await {
            return false;
        }
        self.send(&CommandExecuted {
            server: ALL_SERVERS.to_string(),
            command_type: command_type.to_string(),
            executor: BRIDGE_EXECUTOR.to_string(),
            args: Some(args),
        })
        .await
    }

    async fn send_validated<S: ActionSchema>(&self, payload: &S) -> Result<bool, BridgeError> {
        if !self.servers_available().await {
            return Ok(false);
        }
        payload.validate(&*self.bridge.sessions.lock().await)?;
        Ok(self.send(payload).await)
    }
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbound")
            .field("links", &self.links.is_some())
            .finish_non_exhaustive()
    }
}
