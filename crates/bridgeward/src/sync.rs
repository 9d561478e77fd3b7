//! Mirroring game-side moderation commands onto the chat platform.
//!
//! When a moderator runs `/tempban Steve 3d griefing` on a game server, the
//! peer sends a `command-executed` frame. [`PunishmentSync`] turns it into
//! the matching chat-platform action:
//!
//! | `command_type` | Effect |
//! |----------------|--------|
//! | `kick` | kick the linked member |
//! | `ban` | permanent ban |
//! | `tempban` | ban through the scheduler, lifted after `duration` |
//! | `timeout` | timeout through the scheduler, chunked past 28 days |
//! | `unban` | unban, and drop any scheduled ban |
//! | `untimeout` | clear the timeout, and drop any scheduled one |
//!
//! Which types are mirrored at all is decided by a [`CommandSyncPolicy`].
//! Game usernames become chat user ids through [`AccountLinks`].

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use bridgeward_protocol::CommandExecuted;
use bridgeward_scheduler::{
    ModerationError, PunishmentKind, PunishmentScheduler, SchedulerError, UserId, parse_duration,
};
use tracing::{debug, info, warn};

use crate::BridgeError;

// ---------------------------------------------------------------------------
// Account links
// ---------------------------------------------------------------------------

/// Links between chat-platform users and game accounts.
#[async_trait]
pub trait AccountLinks: Send + Sync + 'static {
    /// The chat user linked to a game username.
    async fn user_for_player(&self, username: &str) -> Option<UserId>;

    /// The game UUID stored for a chat user.
    async fn player_uuid_for(&self, user: UserId) -> Option<String>;
}

/// A fixed table of links.
#[derive(Debug, Clone, Default)]
pub struct StaticAccountLinks {
    by_username: HashMap<String, UserId>,
    uuids: HashMap<UserId, String>,
}

impl StaticAccountLinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(mut self, user: UserId, username: impl Into<String>, uuid: impl Into<String>) -> Self {
        self.by_username.insert(username.into(), user);
        self.uuids.insert(user, uuid.into());
        self
    }
}

#[async_trait]
impl AccountLinks for StaticAccountLinks {
    async fn user_for_player(&self, username: &str) -> Option<UserId> {
        self.by_username.get(username).copied()
    }

    async fn player_uuid_for(&self, user: UserId) -> Option<String> {
        self.uuids.get(&user).cloned()
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// The command types mirrored from the game side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSyncPolicy {
    enabled: BTreeSet<String>,
}

impl CommandSyncPolicy {
    pub const COMMANDS: [&'static str; 5] = ["kick", "ban", "unban", "timeout", "untimeout"];

    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            enabled: commands.into_iter().map(Into::into).collect(),
        }
    }

    /// Mirrors every supported command.
    pub fn all() -> Self {
        Self::new(Self::COMMANDS)
    }

    /// `tempban` is allowed whenever `ban` is.
    pub fn allows(&self, command_type: &str) -> bool {
        let key = if command_type == "tempban" { "ban" } else { command_type };
        self.enabled.contains(key)
    }
}

// ---------------------------------------------------------------------------
// PunishmentSync
// ---------------------------------------------------------------------------

pub struct PunishmentSync {
    scheduler: PunishmentScheduler,
    policy: CommandSyncPolicy,
    links: Arc<dyn AccountLinks>,
}

impl PunishmentSync {
    pub fn new(
        scheduler: PunishmentScheduler,
        policy: CommandSyncPolicy,
        links: Arc<dyn AccountLinks>,
    ) -> Self {
        Self {
            scheduler,
            policy,
            links,
        }
    }

    pub fn scheduler(&self) -> &PunishmentScheduler {
        &self.scheduler
    }

    pub fn links(&self) -> &Arc<dyn AccountLinks> {
        &self.links
    }

    /// Mirrors one `command-executed` event.
    ///
    /// Returns `Ok(false)` when the event is ignored: command type not
    /// enabled or unknown, unlinked executor or target, missing or zero
    /// duration. Each case is logged.
    ///
    /// # Errors
    /// [`BridgeError::Scheduler`] when the platform or the punishment store
    /// fails.
    pub async fn handle(&self, event: &CommandExecuted) -> Result<bool, BridgeError> {
        let command = event.command_type.as_str();
        if !self.policy.allows(command) {
            debug!(command, "command sync disabled for this type");
            return Ok(false);
        }

        let Some(executor) = self.links.user_for_player(&event.executor).await else {
            warn!(player = %event.executor, "executor has no linked account");
            return Ok(false);
        };
        let Some(target_name) = event.arg("target") else {
            warn!(command, "command without a target");
            return Ok(false);
        };
        let Some(target) = self.links.user_for_player(target_name).await else {
            warn!(player = target_name, "target has no linked account");
            return Ok(false);
        };
        let reason = event.arg("reason");
        let moderation = self.scheduler.moderation();

        match command {
            "kick" => moderation.kick(target, reason).await.map_err(SchedulerError::from)?,
            "ban" => moderation.ban(target, reason).await.map_err(SchedulerError::from)?,
            "tempban" | "timeout" => {
                let kind = if command == "tempban" {
                    PunishmentKind::Ban
                } else {
                    PunishmentKind::Timeout
                };
                let Some(raw) = event.arg("duration") else {
                    warn!(command, "duration missing");
                    return Ok(false);
                };
                let duration = match parse_duration(raw) {
                    Ok(d) if !d.is_zero() => d,
                    Ok(_) => {
                        warn!(command, duration = raw, "zero duration ignored");
                        return Ok(false);
                    }
                    Err(e) => {
                        warn!(command, error = %e, "unparsable duration ignored");
                        return Ok(false);
                    }
                };
                self.scheduler.apply(target, kind, duration, reason).await?;
            }
            "unban" => {
                tolerate_not_found(moderation.unban(target).await)?;
                self.scheduler.lift(target, PunishmentKind::Ban).await?;
            }
            "untimeout" => {
                tolerate_not_found(moderation.clear_timeout(target).await)?;
                self.scheduler.lift(target, PunishmentKind::Timeout).await?;
            }
            other => {
                warn!(command = other, "unhandled command type");
                return Ok(false);
            }
        }

        info!(command, %executor, %target, "game command mirrored");
        Ok(true)
    }
}

/// Lifting something that is already gone is fine.
fn tolerate_not_found(result: Result<(), ModerationError>) -> Result<(), SchedulerError> {
    match result {
        Ok(()) | Err(ModerationError::NotFound(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl std::fmt::Debug for PunishmentSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PunishmentSync")
            .field("scheduler", &self.scheduler)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
