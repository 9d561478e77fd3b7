//! The chat platform's moderation API, as the scheduler sees it.

use std::time::Duration;

use async_trait::async_trait;

use crate::{ModerationError, PunishmentKind, UserId};

/// Moderation actions on the chat platform.
///
/// Implementations should report an unknown member, or an effect that is
/// already gone, as [`ModerationError::NotFound`]. The scheduler treats
/// that as "already resolved" when lifting a punishment.
#[async_trait]
pub trait ModerationBackend: Send + Sync + 'static {
    /// `duration` never exceeds [`MAX_TIMEOUT`](crate::MAX_TIMEOUT).
    async fn timeout(
        &self,
        user: UserId,
        duration: Duration,
        reason: Option<&str>,
    ) -> Result<(), ModerationError>;

    async fn clear_timeout(&self, user: UserId) -> Result<(), ModerationError>;

    async fn ban(&self, user: UserId, reason: Option<&str>) -> Result<(), ModerationError>;

    async fn unban(&self, user: UserId) -> Result<(), ModerationError>;

    async fn kick(&self, user: UserId, reason: Option<&str>) -> Result<(), ModerationError>;
}

/// Puts `kind` in place for `chunk`.
pub(crate) async fn apply_chunk(
    backend: &dyn ModerationBackend,
    user: UserId,
    kind: PunishmentKind,
    chunk: Duration,
    reason: Option<&str>,
) -> Result<(), ModerationError> {
    match kind {
        PunishmentKind::Timeout => backend.timeout(user, chunk, reason).await,
        PunishmentKind::Ban => backend.ban(user, reason).await,
    }
}

/// Lifts `kind`.
pub(crate) async fn revert(
    backend: &dyn ModerationBackend,
    user: UserId,
    kind: PunishmentKind,
) -> Result<(), ModerationError> {
    match kind {
        PunishmentKind::Timeout => backend.clear_timeout(user).await,
        PunishmentKind::Ban => backend.unban(user).await,
    }
}
