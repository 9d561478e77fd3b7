//! Per-connection listener: admission, authentication, and dispatch.
//!
//! Each accepted connection gets its own Tokio task running
//! [`handle_connection`]. The flow follows [`PeerState`]:
//!   1. `Connected`: check the source address → close 1008 if refused
//!   2. `AuthPending`: wait for `authenticate` until the deadline → close
//!      1008 on timeout or bad password; every other action is dropped
//!   3. `Authenticated`: decode frames and dispatch them through the
//!      registry, one at a time, in arrival order
//!   4. `Closed`: the guard removes the session and rebuilds the server
//!      directory
//!
//! Nothing a peer sends after step 1 can crash the task: malformed JSON,
//! unknown actions, invalid payloads, and failing handlers are logged and
//! the loop moves on to the next frame.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bridgeward_protocol::{ActionSchema, Authenticate, Codec, NoServers, RawFrame};
use bridgeward_session::{Authenticator, PeerState, SessionError};
use bridgeward_transport::{CLOSE_POLICY_VIOLATION, Connection, ConnectionId, WebSocketConnection};
use futures_util::FutureExt;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::server::ServerState;

const REASON_IP_REFUSED: &str = "Connection not allowed from this IP";
const REASON_AUTH_TIMEOUT: &str = "Authentication timeout";
const REASON_DUPLICATE: &str = "Connection already exists";

/// Drop guard that tears a connection's session down when the listener
/// exits.
///
/// This ensures cleanup happens even if the listener panics. Since `Drop`
/// is synchronous, we spawn a fire-and-forget task for the async locks.
struct SessionGuard<A: Authenticator> {
    conn_id: ConnectionId,
    state: Arc<ServerState<A>>,
}

impl<A: Authenticator> Drop for SessionGuard<A> {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let bridge = &state.bridge;
            let mut sessions = bridge.sessions.lock().await;
            sessions.remove(conn_id);
            // Rebuilt even when this connection never authenticated. With
            // a single peer this is the same as clearing.
            bridge.servers.lock().await.rebuild_from(&sessions);
            drop(sessions);
            info!(%conn_id, "connection closed");
        });
    }
}

/// What the loop does after one frame.
enum Flow {
    Continue,
    Close,
}

/// Handles a single connection from upgrade to close.
///
/// `deadline` is when authentication must be done by. It is set when the
/// TCP connection is accepted, so the handshakes count against it too.
pub(crate) async fn handle_connection<A: Authenticator>(
    conn: Arc<WebSocketConnection>,
    state: Arc<ServerState<A>>,
    deadline: Instant,
) {
    let conn_id = conn.id();
    let addr = conn.peer_addr();
    debug!(%conn_id, %addr, "handling new connection");

    // --- Connected: address check ---
    if let Err(e) = state.policy.check(addr.ip()) {
        warn!(%conn_id, error = %e, "connection refused");
        close(&conn, REASON_IP_REFUSED).await;
        return;
    }

    let _guard = SessionGuard {
        conn_id,
        state: Arc::clone(&state),
    };
    let mut peer = PeerState::AuthPending;
    let deadline = tokio::time::sleep_until(deadline);
    tokio::pin!(deadline);

    // --- Frame loop ---
    loop {
        let received = if peer == PeerState::AuthPending {
            tokio::select! {
                _ = &mut deadline => {
                    warn!(%conn_id, "authentication deadline passed");
                    close(&conn, REASON_AUTH_TIMEOUT).await;
                    break;
                }
                received = conn.recv() => received,
            }
        } else {
            conn.recv().await
        };

        let data = match received {
            Ok(Some(data)) => data,
            Ok(None) => {
                debug!(%conn_id, "peer closed the connection");
                break;
            }
            Err(e) => {
                debug!(%conn_id, error = %e, "recv error");
                break;
            }
        };

        let flow = match peer {
            PeerState::AuthPending => authenticate(&conn, &state, &data, &mut peer).await,
            _ => {
                dispatch(&conn, &state, &data).await;
                Flow::Continue
            }
        };
        if let Flow::Close = flow {
            break;
        }
    }

    // Also removed by the guard; doing it here means the peer stops being
    // a send target before this task ends.
    state.bridge.sessions.lock().await.remove(conn_id);
    // _guard drops here → server directory is rebuilt.
}

/// Decodes the action name, or logs why the frame is dropped.
fn read_frame<A: Authenticator>(
    state: &ServerState<A>,
    conn_id: ConnectionId,
    data: &[u8],
) -> Option<(String, RawFrame)> {
    let frame: RawFrame = match state.bridge.codec.decode(data) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(%conn_id, error = %e, "malformed frame dropped");
            return None;
        }
    };
    match frame.action() {
        Ok(action) => Some((action.to_string(), frame)),
        Err(e) => {
            warn!(%conn_id, error = %e, "frame dropped");
            None
        }
    }
}

/// Handles one frame while the connection is waiting to authenticate.
async fn authenticate<A: Authenticator>(
    conn: &Arc<WebSocketConnection>,
    state: &Arc<ServerState<A>>,
    data: &[u8],
    peer: &mut PeerState,
) -> Flow {
    let conn_id = conn.id();
    let Some((action, frame)) = read_frame(state, conn_id, data) else {
        return Flow::Continue;
    };
    if !peer.accepts(&action, Authenticate::ACTION) {
        warn!(%conn_id, %action, "action before authentication dropped");
        return Flow::Continue;
    }

    let payload = match Authenticate::from_fields(frame.fields, &NoServers) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(%conn_id, error = %e, "invalid authenticate payload dropped");
            return Flow::Continue;
        }
    };

    if let Err(e) = state.auth.authenticate(&payload).await {
        warn!(%conn_id, error = %e, "authentication failed");
        let reason = match &e {
            SessionError::AuthFailed(detail) => format!("Authentication failed: {detail}"),
            other => format!("Authentication failed: {other}"),
        };
        close(conn, &reason).await;
        *peer = PeerState::Closed;
        return Flow::Close;
    }

    let bridge = &state.bridge;
    {
        let mut sessions = bridge.sessions.lock().await;
        if let Err(e) = sessions.create(Arc::clone(conn), payload.server_list.clone()) {
            warn!(%conn_id, error = %e, "duplicate authentication refused");
            drop(sessions);
            close(conn, REASON_DUPLICATE).await;
            *peer = PeerState::Closed;
            return Flow::Close;
        }
        bridge.servers.lock().await.merge(payload.server_list.iter().cloned());
    }

    info!(%conn_id, servers = ?payload.server_list, "peer authenticated");
    *peer = PeerState::Authenticated;
    Flow::Continue
}

/// Handles one frame from an authenticated peer.
async fn dispatch<A: Authenticator>(
    conn: &Arc<WebSocketConnection>,
    state: &Arc<ServerState<A>>,
    data: &[u8],
) {
    let conn_id = conn.id();
    let Some((action, frame)) = read_frame(state, conn_id, data) else {
        return;
    };

    let Some(entry) = state.registry.lookup(&action) else {
        warn!(%conn_id, %action, "unknown action ignored");
        return;
    };

    let mut providers = state.providers.clone();
    providers.connection = Some(Arc::clone(conn));
    let ctx = match providers.resolve(entry.dependencies()) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!(%conn_id, %action, error = %e, "handler not runnable");
            return;
        }
    };

    let prepared = {
        let sessions = state.bridge.sessions.lock().await;
        entry.prepare(ctx, frame.fields, &*sessions)
    };
    let handler = match prepared {
        Ok(handler) => handler,
        Err(e) => {
            warn!(%conn_id, %action, error = %e, "invalid payload dropped");
            return;
        }
    };

    debug!(%conn_id, %action, schema = entry.schema(), "dispatching");
    match AssertUnwindSafe(handler).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(%conn_id, %action, error = %e, "handler failed"),
        Err(_) => error!(%conn_id, %action, "handler panicked"),
    }
}

async fn close(conn: &WebSocketConnection, reason: &str) {
    if let Err(e) = conn.close_with(CLOSE_POLICY_VIOLATION, reason).await {
        debug!(conn_id = %conn.id(), error = %e, "close frame not sent");
    }
}
