//! Built-in handlers for inbound actions.
//!
//! `authenticate` is special: while a connection is still pending, the
//! listener runs the authenticator itself. The handler registered here
//! only sees `authenticate` frames from connections that already have a
//! session, and turns them away.

use bridgeward_protocol::{Authenticate, CommandExecuted, PlayerServerCheck, PlayerStatusCheck};
use bridgeward_transport::{CLOSE_POLICY_VIOLATION, Connection};
use tracing::{debug, warn};

use crate::{ActionRegistry, BridgeError, Dependency, HandlerContext};

/// The registry every bridge starts from.
///
/// `command-executed` is left out; the server builder adds it when a
/// punishment sync is configured (see [`register_command_sync`]).
pub fn default_registry() -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    registry
        .register::<Authenticate, _, _>(&[Dependency::Connection], reject_duplicate_auth)
        .register::<PlayerStatusCheck, _, _>(&[Dependency::Bridge], player_status_check)
        .register::<PlayerServerCheck, _, _>(&[Dependency::Bridge], player_server_check);
    registry
}

/// Adds the `command-executed` handler.
pub fn register_command_sync(registry: &mut ActionRegistry) {
    registry.register::<CommandExecuted, _, _>(&[Dependency::Sync], command_executed);
}

async fn reject_duplicate_auth(ctx: HandlerContext, _payload: Authenticate) -> Result<(), BridgeError> {
    let conn = ctx.connection()?;
    warn!(conn_id = %conn.id(), "authenticate on an authenticated connection");
    conn.close_with(CLOSE_POLICY_VIOLATION, "Connection already exists")
        .await?;
    Ok(())
}

async fn player_status_check(ctx: HandlerContext, payload: PlayerStatusCheck) -> Result<(), BridgeError> {
    debug!(
        username = ?payload.username,
        uuid = ?payload.uuid,
        online = ?payload.online,
        "player status reply"
    );
    ctx.bridge()?.players.record_status(
        payload.username.as_deref(),
        payload.uuid.as_deref(),
        payload.online,
    );
    Ok(())
}

async fn player_server_check(ctx: HandlerContext, payload: PlayerServerCheck) -> Result<(), BridgeError> {
    debug!(
        username = ?payload.username,
        uuid = ?payload.uuid,
        server = ?payload.server,
        "player server reply"
    );
    ctx.bridge()?.players.record_server(
        payload.username.as_deref(),
        payload.uuid.as_deref(),
        payload.server.as_deref(),
    );
    Ok(())
}

async fn command_executed(ctx: HandlerContext, payload: CommandExecuted) -> Result<(), BridgeError> {
    debug!(
        server = %payload.server,
        command = %payload.command_type,
        executor = %payload.executor,
        "game command executed"
    );
    ctx.sync()?.handle(&payload).await?;
    Ok(())
}
