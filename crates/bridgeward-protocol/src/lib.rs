//! Wire protocol for Bridgeward.
//!
//! This crate defines the "language" the bridge and the game-server
//! plugins speak:
//!
//! - **Envelope** ([`RawFrame`], [`ActionFrame`], [`frame`]) — every
//!   message is a flat JSON object with an `action` field.
//! - **Schemas** ([`ActionSchema`] and the action structs) — what each
//!   action carries, and the rules serde alone can't check.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how frames become text
//!   and back.
//! - **Errors** ([`ProtocolError`]) — what can go wrong while decoding or
//!   validating.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw frames) and the
//! listener (handlers). It doesn't know about connections or sessions;
//! the one piece of outside state it needs, the set of advertised server
//! names, comes in through the [`ServerLookup`] trait.
//!
//! ```text
//! Transport (bytes) → Protocol (RawFrame → schema) → Listener (handler)
//! ```

mod actions;
mod codec;
mod envelope;
mod error;
mod types;

pub use actions::{
    Authenticate, CommandExecuted, DispatchCommand, PlayerServerCheck,
    PlayerStatusCheck, SendGlobalMessage, SendPlayerMessage,
    SendServerMessage,
};
pub use codec::{Codec, JsonCodec};
pub use envelope::{
    ALL_SERVERS, ActionFrame, ActionSchema, NoServers, RESERVED_SERVERS,
    RawFrame, ServerLookup, frame, is_reserved_server,
};
pub use error::ProtocolError;
pub use types::{MAX_USERNAME_LEN, MAX_UUID_LEN, MessageType, PlayerKey};
