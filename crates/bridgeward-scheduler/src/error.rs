//! Scheduler error types.

/// A failure reported by the persistence collaborator.
#[derive(Debug, thiserror::Error)]
#[error("punishment store: {0}")]
pub struct StoreError(pub String);

/// A failure reported by the chat platform's moderation API.
#[derive(Debug, thiserror::Error)]
pub enum ModerationError {
    /// The target is gone or the effect is already lifted.
    ///
    /// When reverting a punishment this counts as success: the effect was
    /// resolved outside the scheduler.
    #[error("moderation target not found: {0}")]
    NotFound(String),

    #[error("moderation call failed: {0}")]
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Persisting a record failed. Surfaced to the caller because the
    /// in-memory timers and the stored state would otherwise disagree.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Moderation(#[from] ModerationError),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),
}
