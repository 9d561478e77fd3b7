//! Persistent punishment scheduler for Bridgeward.
//!
//! Temporary bans and timeouts outlive the process that issued them, so
//! their state is stored through a [`PunishmentStore`] and their timers
//! are rebuilt from it by [`PunishmentScheduler::recover`] on startup.
//!
//! # The 28-day ceiling
//!
//! The chat platform refuses timeouts longer than [`MAX_TIMEOUT`]. A longer
//! timeout is applied in chunks: the first chunk now, then another each
//! time the previous one runs out, until the last chunk ends exactly at
//! the requested expiry.
//!
//! ```text
//! 3,000,000 s timeout
//! ├─ t = 0          apply 2,419,200 s   refresh_at = t + 2,419,200
//! ├─ t = 2,419,200  apply   580,800 s   refresh_at cleared
//! └─ t = 3,000,000  clear timeout, delete record
//! ```
//!
//! # Collaborators
//!
//! | Trait | Provided by the application |
//! |-------|-----------------------------|
//! | [`PunishmentStore`] | where records live |
//! | [`ModerationBackend`] | the chat platform's ban/timeout calls |
//! | [`Clock`] | wall time ([`SystemClock`], or [`TokioClock`] in tests) |

mod clock;
mod duration;
mod error;
mod moderation;
mod record;
mod registry;
mod scheduler;
mod store;

pub use clock::{Clock, SystemClock, TokioClock};
pub use duration::parse_duration;
pub use error::{ModerationError, SchedulerError, StoreError};
pub use moderation::ModerationBackend;
pub use record::{
    MAX_TIMEOUT, PunishmentFilter, PunishmentKind, PunishmentRecord, RecordId, TaskKey, UserId,
};
pub use registry::TaskRegistry;
pub use scheduler::{PunishmentScheduler, RecoveryReport};
pub use store::{InMemoryPunishmentStore, PunishmentStore};
