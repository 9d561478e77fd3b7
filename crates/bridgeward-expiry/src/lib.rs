//! Time-to-live containers for Bridgeward.
//!
//! The bridge never gets a direct answer to a question it asks the game
//! servers. Replies arrive later, on their own, and are written into the
//! containers in this crate. Callers then read the container as a
//! mailbox: "did anyone tell us Steve is online in the last 10 seconds?"
//!
//! - [`ExpiringMap`] — key → value, each entry lives for a fixed TTL.
//! - [`ExpiringSet`] — the same thing without values.
//!
//! Re-inserting a key *refreshes* it: the countdown starts over from the
//! moment of the re-insert.
//!
//! # Expiration modes
//!
//! ```text
//! Eager:  background thread ──(every min(ttl/10, 1s))──→ sweep
//! Lazy:   no thread; every read sweeps first
//! ```
//!
//! Both modes share one lock per container, so the sweeper thread and
//! async tasks on the Tokio runtime can use the same container safely.

mod error;
mod map;
mod set;

pub use error::ExpiryError;
pub use map::{ExpiringMap, ExpiryMode};
pub use set::ExpiringSet;
