//! The punishment scheduler.
//!
//! # Lifecycle of one punishment
//!
//! ```text
//!   apply(d ≤ max) ─────────────────────────────┐
//!                                               ▼
//!   apply(d > max) ─→ Refreshing ─(refresh_at)─→ Active ─(expires_at)─→ Expired
//!                       ▲     │                                           │
//!                       └─────┘ remaining > max:                 revert + delete
//!                         apply another max chunk
//! ```
//!
//! Every state lives in the persisted [`PunishmentRecord`]: `refresh_at`
//! set means "Refreshing", unset means "Active until `expires_at`". A timer
//! never carries state of its own. When it fires it re-reads the record
//! and advances it one step, which is the same code path startup recovery
//! uses. A restart therefore resumes exactly where the process stopped.
//!
//! # Timers
//!
//! Each key has at most one timer in the [`TaskRegistry`]. A timer sleeps,
//! then hands the actual work to a detached task. Cancelling a key only
//! stops a sleeping timer; a step that has already started runs to the
//! end.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, error, info, warn};

use crate::moderation::{apply_chunk, revert};
use crate::{
    Clock, ModerationBackend, ModerationError, PunishmentFilter, PunishmentKind,
    PunishmentRecord, PunishmentStore, SchedulerError, SystemClock, TaskKey, TaskRegistry,
    UserId,
};

/// Longest single `sleep`. Long bans wake up once a year to re-check the
/// clock, which keeps every sleep inside tokio's timer range.
const MAX_SLEEP: Duration = Duration::from_secs(365 * 86_400);

// ---------------------------------------------------------------------------
// PunishmentScheduler
// ---------------------------------------------------------------------------

/// Owns every temporary ban and timeout.
///
/// Cheap to clone: clones share the same timers, store, and backend.
#[derive(Clone)]
pub struct PunishmentScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn PunishmentStore>,
    moderation: Arc<dyn ModerationBackend>,
    clock: Arc<dyn Clock>,
    tasks: TaskRegistry<TaskKey>,
}

/// What [`PunishmentScheduler::recover`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Records whose expiry had passed and were lifted on the spot.
    pub expired: usize,
    /// Records that got a timer again.
    pub rearmed: usize,
    /// Records that could not be handled; they stay in the store.
    pub failed: usize,
}

impl PunishmentScheduler {
    /// Creates a scheduler on the system clock.
    pub fn new(store: Arc<dyn PunishmentStore>, moderation: Arc<dyn ModerationBackend>) -> Self {
        Self::with_clock(store, moderation, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn PunishmentStore>,
        moderation: Arc<dyn ModerationBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                moderation,
                clock,
                tasks: TaskRegistry::new(),
            }),
        }
    }

    /// The moderation backend, for one-shot actions (kick, permanent ban)
    /// that need no timer.
    pub fn moderation(&self) -> &dyn ModerationBackend {
        self.inner.moderation.as_ref()
    }

    /// Puts a temporary punishment in place and schedules its end.
    ///
    /// A duration over the kind's [`max_chunk`](PunishmentKind::max_chunk)
    /// is applied one maximum-size chunk at a time. An existing punishment
    /// of the same kind for the same user is replaced.
    ///
    /// # Errors
    /// - [`SchedulerError::Moderation`]: the platform refused; nothing was
    ///   stored or scheduled.
    /// - [`SchedulerError::Store`]: the punishment is in effect on the
    ///   platform but could not be persisted, and no timer was armed.
    pub async fn apply(
        &self,
        user_id: UserId,
        kind: PunishmentKind,
        duration: Duration,
        reason: Option<&str>,
    ) -> Result<PunishmentRecord, SchedulerError> {
        let key = TaskKey::new(user_id, kind);
        let now = self.inner.clock.now();
        let expires_at = after(now, duration);

        let (chunk, refresh_at) = match kind.max_chunk() {
            Some(max) if duration > max => (max, Some(after(now, max))),
            _ => (duration, None),
        };

        apply_chunk(self.inner.moderation.as_ref(), user_id, kind, chunk, reason).await?;

        let existing = self
            .inner
            .store
            .list_filtered(&PunishmentFilter::for_key(key))
            .await?;
        let record = PunishmentRecord {
            id: existing.first().and_then(|r| r.id),
            user_id,
            kind,
            reason: reason.map(str::to_string),
            expires_at,
            refresh_at,
        };
        let record = self.inner.store.upsert(record).await?;

        info!(
            %key,
            chunk_secs = chunk.as_secs(),
            %expires_at,
            refresh_at = ?record.refresh_at,
            "punishment applied"
        );
        self.inner.arm(&record);
        Ok(record)
    }

    /// Cancels the timer for `(user_id, kind)` and deletes its records.
    ///
    /// Used when the punishment is lifted by hand. The platform-side
    /// effect is not touched. Returns `true` if anything was deleted.
    ///
    /// # Errors
    /// [`SchedulerError::Store`] if listing or deleting fails. The timer is
    /// cancelled either way.
    pub async fn lift(&self, user_id: UserId, kind: PunishmentKind) -> Result<bool, SchedulerError> {
        let key = TaskKey::new(user_id, kind);
        let cancelled = self.inner.tasks.cancel(&key);

        let mut deleted = false;
        for record in self
            .inner
            .store
            .list_filtered(&PunishmentFilter::for_key(key))
            .await?
        {
            if let Some(id) = record.id {
                deleted |= self.inner.store.delete(id).await?;
            }
        }

        debug!(%key, cancelled, deleted, "punishment lifted");
        Ok(deleted)
    }

    /// Reloads every stored record and brings it up to date.
    ///
    /// Call once at startup. Records that expired while the process was
    /// down are reverted and deleted right here, before this returns, so
    /// calling it twice never reverts twice. Everything else gets its
    /// timer back.
    ///
    /// # Errors
    /// [`SchedulerError::Store`] if the records can't be listed.
    /// Per-record failures are logged and counted in the report.
    pub async fn recover(&self) -> Result<RecoveryReport, SchedulerError> {
        let records = self.inner.store.list_all().await?;
        info!(count = records.len(), "recovering punishments");

        let mut report = RecoveryReport::default();
        for record in records {
            match self.inner.advance(record).await {
                Ok(Step::Expired) => report.expired += 1,
                Ok(Step::Armed) => report.rearmed += 1,
                Ok(Step::Lifted) => {}
                Ok(Step::Kept) | Err(_) => report.failed += 1,
            }
        }

        info!(?report, "punishment recovery finished");
        Ok(report)
    }

    /// Returns `true` while a timer is pending for `(user_id, kind)`.
    pub fn is_scheduled(&self, user_id: UserId, kind: PunishmentKind) -> bool {
        self.inner.tasks.contains(&TaskKey::new(user_id, kind))
    }

    pub fn scheduled_count(&self) -> usize {
        self.inner.tasks.len()
    }

    /// Cancels every pending timer. Stored records are left for the next
    /// [`recover`](Self::recover).
    pub fn shutdown(&self) {
        self.inner.tasks.cancel_all();
    }
}

impl std::fmt::Debug for PunishmentScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PunishmentScheduler")
            .field("tasks", &self.inner.tasks)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Stepping
// ---------------------------------------------------------------------------

/// Outcome of advancing one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Reverted and deleted.
    Expired,
    /// A timer is pending for the next step.
    Armed,
    /// The revert failed; the record stays for the next recovery pass.
    Kept,
    /// Lifted by hand while a chunk was being re-applied.
    Lifted,
}

impl Inner {
    /// Moves `record` forward from wherever it is now.
    ///
    /// A [`lift`](PunishmentScheduler::lift) can land while a chunk is out
    /// at the platform. The record is looked up again before it is written
    /// back, and a deleted one stays deleted.
    async fn advance(self: &Arc<Self>, mut record: PunishmentRecord) -> Result<Step, SchedulerError> {
        let key = record.key();
        let now = self.clock.now();

        if now >= record.expires_at {
            return Ok(self.expire(record).await);
        }

        // Checkpoint still ahead: just wait for it.
        if let Some(refresh_at) = record.refresh_at {
            if now < refresh_at && refresh_at < record.expires_at {
                self.arm(&record);
                return Ok(Step::Armed);
            }
        }

        let remaining = round_secs(record.expires_at - now);
        match record.kind.max_chunk() {
            Some(max) if remaining > max => {
                // Past a checkpoint, or a long record that never started
                // its chain: put on the next full chunk.
                self.reapply(&record, max).await?;
                if !self.still_stored(&record).await? {
                    return Ok(Step::Lifted);
                }
                record.refresh_at = Some(after(now, max));
                record = self.persist(record).await?;
                info!(%key, chunk_secs = max.as_secs(), "punishment chunk refreshed");
            }
            _ if record.refresh_at.is_some() => {
                // Last leg of a chain.
                self.reapply(&record, remaining).await?;
                if !self.still_stored(&record).await? {
                    return Ok(Step::Lifted);
                }
                record.refresh_at = None;
                record = self.persist(record).await?;
                info!(%key, chunk_secs = remaining.as_secs(), "final punishment chunk applied");
            }
            _ => {}
        }

        self.arm(&record);
        Ok(Step::Armed)
    }

    async fn reapply(&self, record: &PunishmentRecord, chunk: Duration) -> Result<(), SchedulerError> {
        apply_chunk(
            self.moderation.as_ref(),
            record.user_id,
            record.kind,
            chunk,
            record.reason.as_deref(),
        )
        .await
        .map_err(|e| {
            error!(key = %record.key(), error = %e, "failed to re-apply punishment");
            SchedulerError::from(e)
        })
    }

    async fn still_stored(&self, record: &PunishmentRecord) -> Result<bool, SchedulerError> {
        let Some(id) = record.id else { return Ok(true) };
        let key = record.key();
        match self.store.get(id).await {
            Ok(Some(_)) => Ok(true),
            Ok(None) => {
                info!(%key, "punishment lifted during refresh; not re-storing it");
                Ok(false)
            }
            Err(e) => {
                error!(%key, error = %e, "failed to re-read punishment");
                Err(e.into())
            }
        }
    }

    async fn persist(&self, record: PunishmentRecord) -> Result<PunishmentRecord, SchedulerError> {
        let key = record.key();
        self.store.upsert(record).await.map_err(|e| {
            error!(%key, error = %e, "failed to persist punishment");
            SchedulerError::from(e)
        })
    }

    /// Lifts the punishment and deletes its record.
    async fn expire(&self, record: PunishmentRecord) -> Step {
        let key = record.key();
        match revert(self.moderation.as_ref(), record.user_id, record.kind).await {
            Ok(()) => info!(%key, "punishment expired"),
            Err(ModerationError::NotFound(reason)) => {
                info!(%key, %reason, "punishment already lifted elsewhere");
            }
            Err(e) => {
                error!(%key, error = %e, "failed to lift punishment; keeping record");
                return Step::Kept;
            }
        }

        if let Some(id) = record.id {
            if let Err(e) = self.store.delete(id).await {
                error!(%key, error = %e, "failed to delete expired punishment");
            }
        }
        Step::Expired
    }

    /// Arms the timer for the record's next step, replacing any old one.
    fn arm(self: &Arc<Self>, record: &PunishmentRecord) {
        let key = record.key();
        let at = match record.refresh_at {
            Some(refresh_at) if refresh_at < record.expires_at => refresh_at,
            _ => record.expires_at,
        };
        let inner = Arc::clone(self);

        self.tasks.arm(key, move |generation| async move {
            loop {
                let left = at - inner.clock.now();
                let Ok(left) = left.to_std() else { break };
                if left.is_zero() {
                    break;
                }
                tokio::time::sleep(left.min(MAX_SLEEP)).await;
            }
            // Detach so a cancel arriving mid-step can't cut it short.
            tokio::spawn(async move { inner.fire(key, generation).await });
        });
        debug!(%key, %at, "punishment timer armed");
    }

    async fn fire(self: Arc<Self>, key: TaskKey, generation: u64) {
        self.tasks.remove_if_current(&key, generation);

        let records = match self.store.list_filtered(&PunishmentFilter::for_key(key)).await {
            Ok(records) => records,
            Err(e) => {
                error!(%key, error = %e, "failed to load punishment; will retry on next recovery");
                return;
            }
        };
        let Some(record) = records.into_iter().next() else {
            warn!(%key, "punishment timer fired without a record");
            return;
        };
        // Errors were logged where they happened.
        let _ = self.advance(record).await;
    }
}

/// `now + duration`, saturating at the far future.
fn after(now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Rounds to whole seconds; negative deltas become zero.
fn round_secs(delta: TimeDelta) -> Duration {
    let millis = delta.num_milliseconds().max(0) as u64;
    Duration::from_secs((millis + 500) / 1_000)
}
