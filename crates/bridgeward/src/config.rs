//! Bridge configuration.
//!
//! Durations are written in seconds in config files (`auth_timeout_secs =
//! 3`), and fractions are allowed (`response_timeout_secs = 0.5`).
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 8765
//! allowed_ip = "10.0.0.5"
//! password = "change-me"
//! auth_timeout_secs = 3
//! response_timeout_secs = 1
//! cert_dir = "configuration/certs"
//! player_cache_ttl_secs = 10
//! ```

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::BridgeError;

pub const DEFAULT_PORT: u16 = 8765;

/// Everything the bridge needs to know at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Interface to listen on, also the name on the certificate. `None`
    /// disables the bridge.
    pub host: Option<String>,

    pub port: u16,

    /// The one source address allowed to connect. `None` admits any.
    pub allowed_ip: Option<IpAddr>,

    /// Shared secret the peer sends in `authenticate`.
    pub password: String,

    /// How long a new connection has to authenticate.
    #[serde(rename = "auth_timeout_secs", deserialize_with = "secs")]
    pub auth_timeout: Duration,

    /// How long fire-and-poll queries wait before reading the cache.
    #[serde(rename = "response_timeout_secs", deserialize_with = "secs")]
    pub response_timeout: Duration,

    /// Where the self-signed certificate is cached.
    pub cert_dir: PathBuf,

    /// Lifetime of the player projections.
    #[serde(rename = "player_cache_ttl_secs", deserialize_with = "secs")]
    pub player_cache_ttl: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            allowed_ip: None,
            password: String::new(),
            auth_timeout: Duration::from_secs(3),
            response_timeout: Duration::from_secs(1),
            cert_dir: PathBuf::from("configuration/certs"),
            player_cache_ttl: Duration::from_secs(10),
        }
    }
}

impl BridgeConfig {
    /// `true` when a host is configured.
    pub fn is_enabled(&self) -> bool {
        self.host.is_some()
    }

    /// `host:port`, or `None` when disabled.
    pub fn bind_addr(&self) -> Option<String> {
        self.host.as_ref().map(|host| format!("{host}:{}", self.port))
    }

    /// Checks the values a running bridge depends on.
    ///
    /// # Errors
    /// [`BridgeError::Config`] for an empty password or a zero timeout/TTL.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.password.is_empty() {
            return Err(BridgeError::Config("password must not be empty".into()));
        }
        for (name, value) in [
            ("auth_timeout_secs", self.auth_timeout),
            ("response_timeout_secs", self.response_timeout),
            ("player_cache_ttl_secs", self.player_cache_ttl),
        ] {
            if value.is_zero() {
                return Err(BridgeError::Config(format!("{name} must be positive")));
            }
        }
        Ok(())
    }
}

fn secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(value).map_err(serde::de::Error::custom)
}
