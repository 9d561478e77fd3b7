//! Punishment records and the keys that identify them.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// The chat platform's ceiling on a single timeout: 28 days.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(2_419_200);

/// A chat-platform user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(u64);

impl UserId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier the store assigns to a record on first upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(u64);

impl RecordId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The temporary effects the scheduler knows how to lift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PunishmentKind {
    Ban,
    Timeout,
}

impl PunishmentKind {
    /// Longest duration the platform accepts in one call, if any.
    ///
    /// Bans are permanent on the platform until lifted, so they never
    /// need chunking.
    pub fn max_chunk(&self) -> Option<Duration> {
        match self {
            Self::Ban => None,
            Self::Timeout => Some(MAX_TIMEOUT),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ban => "ban",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for PunishmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// At most one scheduled task and one record exist per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    pub user_id: UserId,
    pub kind: PunishmentKind,
}

impl TaskKey {
    pub fn new(user_id: UserId, kind: PunishmentKind) -> Self {
        Self { user_id, kind }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user_id, self.kind)
    }
}

/// One active temporary punishment.
///
/// `expires_at` is the true end of the punishment. `refresh_at` is only set
/// while a timeout longer than [`MAX_TIMEOUT`] is being re-applied chunk by
/// chunk; it marks when the current chunk runs out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PunishmentRecord {
    /// `None` until the store has saved the record.
    pub id: Option<RecordId>,
    pub user_id: UserId,
    pub kind: PunishmentKind,
    pub reason: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub refresh_at: Option<DateTime<Utc>>,
}

impl PunishmentRecord {
    pub fn key(&self) -> TaskKey {
        TaskKey::new(self.user_id, self.kind)
    }

    /// Returns `true` while a refresh checkpoint is pending before expiry.
    pub fn is_chained(&self) -> bool {
        self.refresh_at.is_some_and(|at| at < self.expires_at)
    }
}

/// Selects records in [`PunishmentStore::list_filtered`](crate::PunishmentStore::list_filtered).
/// Unset fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PunishmentFilter {
    pub user_id: Option<UserId>,
    pub kind: Option<PunishmentKind>,
}

impl PunishmentFilter {
    pub fn for_key(key: TaskKey) -> Self {
        Self {
            user_id: Some(key.user_id),
            kind: Some(key.kind),
        }
    }

    pub fn matches(&self, record: &PunishmentRecord) -> bool {
        self.user_id.is_none_or(|id| id == record.user_id)
            && self.kind.is_none_or(|kind| kind == record.kind)
    }
}
