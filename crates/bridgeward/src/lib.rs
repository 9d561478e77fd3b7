//! # Bridgeward
//!
//! A bridge between a chat platform and a network of game servers.
//!
//! A game-side peer (usually a proxy plugin) connects over a TLS WebSocket,
//! authenticates with a shared secret, and then the two sides trade JSON
//! action frames: the bridge asks about players and sends messages and
//! console commands, the peer answers and reports moderation commands run
//! in game. Those can be mirrored onto the chat platform through the
//! punishment scheduler, which keeps long timeouts alive past the
//! platform's 28-day ceiling.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bridgeward::prelude::*;
//!
//! # async fn start() -> Result<(), BridgeError> {
//! let config = BridgeConfig {
//!     host: Some("0.0.0.0".into()),
//!     password: "change-me".into(),
//!     ..BridgeConfig::default()
//! };
//! let auth = SharedSecretAuthenticator::new(config.password.clone());
//! let server = BridgeServerBuilder::new().config(config).build(auth).await?;
//!
//! let outbound = server.outbound();
//! tokio::spawn(async move {
//!     outbound.send_global_message(MessageType::Info, "Bridge online").await;
//! });
//! server.run().await
//! # }
//! ```
//!
//! ## Crates
//!
//! | Crate | Re-exported as |
//! |-------|----------------|
//! | `bridgeward-transport` | [`transport`] |
//! | `bridgeward-protocol` | [`protocol`] |
//! | `bridgeward-session` | [`session`] |
//! | `bridgeward-expiry` | [`expiry`] |
//! | `bridgeward-scheduler` | [`scheduler`] |

mod actions;
mod config;
mod error;
mod listener;
pub mod logging;
mod outbound;
mod registry;
mod server;
mod state;
mod sync;

pub use actions::{default_registry, register_command_sync};
pub use config::{BridgeConfig, DEFAULT_PORT};
pub use error::BridgeError;
pub use outbound::{BRIDGE_EXECUTOR, Outbound, PlayerRef};
pub use registry::{
    ActionRegistry, Dependency, HandlerContext, HandlerFuture, Providers, RegisteredAction,
};
pub use server::{BridgeServer, BridgeServerBuilder};
pub use state::BridgeState;
pub use sync::{AccountLinks, CommandSyncPolicy, PunishmentSync, StaticAccountLinks};

pub use bridgeward_expiry as expiry;
pub use bridgeward_protocol as protocol;
pub use bridgeward_scheduler as scheduler;
pub use bridgeward_session as session;
pub use bridgeward_transport as transport;

/// The types most embedders need.
pub mod prelude {
    pub use crate::{
        AccountLinks, ActionRegistry, BridgeConfig, BridgeError, BridgeServer, BridgeServerBuilder,
        BridgeState, CommandSyncPolicy, Dependency, HandlerContext, Outbound, PlayerRef,
        PunishmentSync, StaticAccountLinks,
    };
    pub use bridgeward_protocol::{ActionSchema, MessageType, PlayerKey};
    pub use bridgeward_scheduler::{
        InMemoryPunishmentStore, ModerationBackend, PunishmentKind, PunishmentScheduler, UserId,
    };
    pub use bridgeward_session::{Authenticator, SharedSecretAuthenticator};
    pub use bridgeward_transport::TlsMode;
}
