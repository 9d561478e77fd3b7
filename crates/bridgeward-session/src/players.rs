//! Short-lived projections of player state, filled by inbound replies.
//!
//! The bridge never gets a direct answer to "is Steve online?". It sends a
//! query, and some time later the peer sends back a `player-status-check`
//! frame. The listener writes that reply here, and whoever asked reads it
//! back after a short wait. Each fact expires after the configured TTL
//! (10 seconds by default) so a player who logged out stops looking
//! online without anyone telling us.
//!
//! | Projection | Key                 | Value     |
//! |------------|---------------------|-----------|
//! | online     | username *and* uuid | —         |
//! | uuids      | username            | uuid      |
//! | servers    | username *and* uuid | server    |

use std::time::Duration;

use bridgeward_expiry::{ExpiringMap, ExpiringSet, ExpiryError};

/// The three player projections, sharing one TTL.
#[derive(Debug)]
pub struct PlayerDirectory {
    online: ExpiringSet<String>,
    uuids: ExpiringMap<String, String>,
    servers: ExpiringMap<String, String>,
}

impl PlayerDirectory {
    /// Creates the projections, each with its own sweeper thread.
    ///
    /// # Errors
    /// Returns [`ExpiryError::InvalidTtl`] for a zero TTL.
    pub fn new(ttl: Duration) -> Result<Self, ExpiryError> {
        Ok(Self {
            online: ExpiringSet::eager(ttl)?,
            uuids: ExpiringMap::eager(ttl)?,
            servers: ExpiringMap::eager(ttl)?,
        })
    }

    /// Applies a `player-status-check` reply.
    ///
    /// `online == true` marks every given identifier online and, when both
    /// are present, maps the username to the uuid. `online == false`
    /// drops the identifiers from the online set right away instead of
    /// waiting for them to age out.
    pub fn record_status(
        &self,
        username: Option<&str>,
        uuid: Option<&str>,
        online: Option<bool>,
    ) {
        match online {
            Some(true) => {
                for key in username.into_iter().chain(uuid) {
                    self.online.insert(key.to_string());
                }
                if let (Some(name), Some(id)) = (username, uuid) {
                    self.uuids.insert(name.to_string(), id.to_string());
                }
            }
            Some(false) => {
                for key in username.into_iter().chain(uuid) {
                    self.online.remove(&key.to_string());
                }
            }
            None => {}
        }
    }

    /// Applies a `player-server-check` reply. A reply without a server is
    /// ignored.
    pub fn record_server(
        &self,
        username: Option<&str>,
        uuid: Option<&str>,
        server: Option<&str>,
    ) {
        let Some(server) = server else {
            return;
        };
        for key in username.into_iter().chain(uuid) {
            self.servers.insert(key.to_string(), server.to_string());
        }
    }

    /// `key` is a username or a uuid.
    pub fn is_online(&self, key: &str) -> bool {
        self.online.contains(&key.to_string())
    }

    pub fn uuid_of(&self, username: &str) -> Option<String> {
        self.uuids.get(&username.to_string())
    }

    /// `key` is a username or a uuid.
    pub fn server_of(&self, key: &str) -> Option<String> {
        self.servers.get(&key.to_string())
    }

    pub fn online_players(&self) -> Vec<String> {
        self.online.members()
    }

    /// Forgets everything.
    pub fn clear(&self) {
        self.online.clear();
        self.uuids.clear();
        self.servers.clear();
    }

    /// Stops the sweeper threads.
    pub fn shutdown(&self) {
        self.online.shutdown();
        self.uuids.shutdown();
        self.servers.shutdown();
    }
}
