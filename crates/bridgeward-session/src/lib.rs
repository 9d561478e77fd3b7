//! Peer session management for Bridgeward.
//!
//! This crate holds everything the bridge knows about the other side:
//!
//! 1. **Admission** — who may connect and authenticate ([`AddressPolicy`],
//!    [`Authenticator`], [`SharedSecretAuthenticator`])
//! 2. **Sessions** — which peers are authenticated, and which one gets
//!    outbound commands ([`SessionStore`], [`PeerHandle`])
//! 3. **Server names** — the global set of servers the peers front
//!    ([`ServerDirectory`])
//! 4. **Player projections** — recent replies about players, kept for a
//!    few seconds ([`PlayerDirectory`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Bridge (above)  ← listener creates sessions, outbound API reads them
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Protocol + Transport + Expiry (below)
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod players;
mod session;
mod store;

pub use auth::{AddressPolicy, Authenticator, SharedSecretAuthenticator};
pub use error::SessionError;
pub use players::PlayerDirectory;
pub use session::{PeerHandle, PeerState, Session};
pub use store::{ServerDirectory, SessionStore};
