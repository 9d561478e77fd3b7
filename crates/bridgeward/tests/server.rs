//! Integration tests for the bridge: a real listener, a tokio-tungstenite
//! client playing the game-side peer, and the outbound API on top.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bridgeward::prelude::*;
use bridgeward::scheduler::ModerationError;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

const PASSWORD: &str = "secret";

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

// =========================================================================
// Helpers
// =========================================================================

struct Running {
    addr: String,
    state: Arc<BridgeState>,
    outbound: Outbound,
}

fn config() -> BridgeConfig {
    BridgeConfig {
        password: PASSWORD.into(),
        ..BridgeConfig::default()
    }
}

/// Starts a plain-text bridge on a random port.
async fn start_with(config: BridgeConfig, sync: Option<Arc<PunishmentSync>>) -> Running {
    let auth = SharedSecretAuthenticator::new(config.password.clone());
    let mut builder = BridgeServerBuilder::new()
        .config(config)
        .bind("127.0.0.1:0")
        .tls(TlsMode::Disabled);
    if let Some(sync) = sync {
        builder = builder.punishment_sync(sync);
    }
    let server = builder.build(auth).await.expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();
    let state = server.state();
    let outbound = server.outbound();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    Running {
        addr,
        state,
        outbound,
    }
}

async fn start() -> Running {
    start_with(config(), None).await
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send_json(ws: &mut ClientWs, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("send");
}

/// Sends `authenticate` and waits until the bridge knows the servers.
async fn authenticate(running: &Running, ws: &mut ClientWs, servers: &[&str]) {
    send_json(
        ws,
        json!({"action": "authenticate", "password": PASSWORD, "server_list": servers}),
    )
    .await;
    let state = Arc::clone(&running.state);
    wait_until(|| {
        let state = Arc::clone(&state);
        async move { state.session_count().await == 1 }
    })
    .await;
}

/// Polls `check` every 10ms for up to two seconds.
async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within two seconds");
}

/// Reads the next text frame as JSON.
async fn next_json(ws: &mut ClientWs) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("frame within two seconds")
        .expect("stream open")
        .expect("frame ok");
    serde_json::from_str(msg.into_text().expect("text frame").as_str()).expect("json")
}

/// Waits for the close frame and returns its reason.
async fn expect_policy_close(ws: &mut ClientWs) -> String {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(3), ws.next())
            .await
            .expect("close within three seconds");
        match msg {
            Some(Ok(Message::Close(Some(frame)))) => {
                assert_eq!(frame.code, CloseCode::Policy);
                return frame.reason.as_str().to_string();
            }
            Some(Ok(_)) => continue,
            other => panic!("expected close frame, got {other:?}"),
        }
    }
}

// =========================================================================
// Admission and authentication
// =========================================================================

#[tokio::test]
async fn test_authenticate_registers_servers_with_all() {
    let running = start().await;
    let mut ws = connect(&running.addr).await;

    authenticate(&running, &mut ws, &["lobby"]).await;
    assert_eq!(running.state.known_servers().await, vec!["all", "lobby"]);
}

#[tokio::test]
async fn test_authenticate_wrong_password_closes_with_policy() {
    let running = start().await;
    let mut ws = connect(&running.addr).await;

    send_json(
        &mut ws,
        json!({"action": "authenticate", "password": "nope", "server_list": ["lobby"]}),
    )
    .await;

    let reason = expect_policy_close(&mut ws).await;
    assert!(reason.starts_with("Authentication failed"), "{reason}");
    assert_eq!(running.state.session_count().await, 0);
    assert!(running.state.known_servers().await.is_empty());
}

#[tokio::test]
async fn test_silent_peer_closed_after_auth_timeout() {
    let running = start_with(
        BridgeConfig {
            auth_timeout: Duration::from_millis(300),
            ..config()
        },
        None,
    )
    .await;
    let mut ws = connect(&running.addr).await;

    let reason = expect_policy_close(&mut ws).await;
    assert_eq!(reason, "Authentication timeout");
}

#[tokio::test]
async fn test_authenticate_before_deadline_stays_open() {
    let running = start_with(
        BridgeConfig {
            auth_timeout: Duration::from_millis(500),
            ..config()
        },
        None,
    )
    .await;
    let mut ws = connect(&running.addr).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    authenticate(&running, &mut ws, &["lobby"]).await;

    // Well past the deadline, the session is still there.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(running.state.session_count().await, 1);
}

#[tokio::test]
async fn test_client_stalled_in_handshake_is_dropped_at_auth_deadline() {
    use tokio::io::AsyncReadExt;

    let running = start_with(
        BridgeConfig {
            auth_timeout: Duration::from_millis(300),
            ..config()
        },
        None,
    )
    .await;

    // Plain TCP, never sends the HTTP upgrade request.
    let mut stream = tokio::net::TcpStream::connect(&running.addr)
        .await
        .expect("should connect");
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .expect("bridge should drop the socket within two seconds");
    match read {
        Ok(0) | Err(_) => {}
        Ok(n) => panic!("unexpected {n} bytes from the bridge"),
    }
    assert_eq!(running.state.session_count().await, 0);
}

#[tokio::test]
async fn test_refused_address_closed_before_auth() {
    let running = start_with(
        BridgeConfig {
            allowed_ip: Some("10.0.0.1".parse().unwrap()),
            ..config()
        },
        None,
    )
    .await;
    let mut ws = connect(&running.addr).await;

    let reason = expect_policy_close(&mut ws).await;
    assert_eq!(reason, "Connection not allowed from this IP");
}

#[tokio::test]
async fn test_second_authenticate_closes_connection() {
    let running = start().await;
    let mut ws = connect(&running.addr).await;
    authenticate(&running, &mut ws, &["lobby"]).await;

    send_json(
        &mut ws,
        json!({"action": "authenticate", "password": PASSWORD, "server_list": ["lobby"]}),
    )
    .await;
    let reason = expect_policy_close(&mut ws).await;
    assert_eq!(reason, "Connection already exists");
}

#[tokio::test]
async fn test_action_before_authenticate_is_dropped() {
    let running = start().await;
    let mut ws = connect(&running.addr).await;

    send_json(
        &mut ws,
        json!({"action": "player-status-check", "username": "Steve", "online": true}),
    )
    .await;
    authenticate(&running, &mut ws, &["lobby"]).await;

    assert!(!running.state.players().is_online("Steve"));
}

// =========================================================================
// Dispatch
// =========================================================================

#[tokio::test]
async fn test_malformed_frames_do_not_end_the_session() {
    let running = start().await;
    let mut ws = connect(&running.addr).await;
    authenticate(&running, &mut ws, &["lobby"]).await;

    ws.send(Message::Text("not json".to_string().into()))
        .await
        .unwrap();
    send_json(&mut ws, json!({"no_action": true})).await;
    send_json(&mut ws, json!({"action": "teleport-everyone"})).await;
    send_json(&mut ws, json!({"action": "player-status-check"})).await;
    send_json(
        &mut ws,
        json!({"action": "player-status-check", "username": "Steve", "online": true}),
    )
    .await;

    let state = Arc::clone(&running.state);
    wait_until(|| {
        let state = Arc::clone(&state);
        async move { state.players().is_online("Steve") }
    })
    .await;
    assert_eq!(running.state.session_count().await, 1);
}

#[tokio::test]
async fn test_disconnect_clears_known_servers() {
    let running = start().await;
    let mut ws = connect(&running.addr).await;
    authenticate(&running, &mut ws, &["lobby", "survival"]).await;

    ws.close(None).await.unwrap();

    let state = Arc::clone(&running.state);
    wait_until(|| {
        let state = Arc::clone(&state);
        async move { state.known_servers().await.is_empty() }
    })
    .await;
    assert_eq!(running.state.session_count().await, 0);
}

// =========================================================================
// Outbound
// =========================================================================

#[tokio::test]
async fn test_outbound_without_peer_sends_nothing() {
    let running = start().await;
    assert!(!running.outbound.send_global_message(MessageType::Info, "hi").await);
    assert!(
        !running
            .outbound
            .fetch_player_status(&PlayerRef::username("Steve"), None)
            .await
    );
}

#[tokio::test]
async fn test_fetch_player_status_round_trip() {
    let running = start().await;
    let mut ws = connect(&running.addr).await;
    authenticate(&running, &mut ws, &["lobby"]).await;

    let outbound = running.outbound.clone();
    let fetch = tokio::spawn(async move {
        outbound
            .fetch_player_status(
                &PlayerRef::username("Steve"),
                Some(Duration::from_millis(300)),
            )
            .await
    });

    let query = next_json(&mut ws).await;
    assert_eq!(query["action"], "player-status-check");
    assert_eq!(query["username"], "Steve");
    assert!(query.get("uuid").is_none());

    send_json(
        &mut ws,
        json!({"action": "player-status-check", "username": "Steve", "uuid": "u-1", "online": true}),
    )
    .await;

    assert!(fetch.await.unwrap());
    // Cached now: answered without another query.
    assert_eq!(
        running.outbound.fetch_player_uuid("Steve", None).await.as_deref(),
        Some("u-1")
    );
}

#[tokio::test]
async fn test_fetch_player_status_without_reply_is_false() {
    let running = start().await;
    let mut ws = connect(&running.addr).await;
    authenticate(&running, &mut ws, &["lobby"]).await;

    let online = running
        .outbound
        .fetch_player_status(&PlayerRef::username("Alex"), Some(Duration::from_millis(100)))
        .await;
    assert!(!online);
    assert_eq!(next_json(&mut ws).await["action"], "player-status-check");
}

#[tokio::test]
async fn test_fetch_player_server_uses_only_server() {
    let running = start().await;
    let mut ws = connect(&running.addr).await;
    authenticate(&running, &mut ws, &["lobby", "velocity"]).await;
    send_json(
        &mut ws,
        json!({"action": "player-status-check", "username": "Steve", "online": true}),
    )
    .await;
    let state = Arc::clone(&running.state);
    wait_until(|| {
        let state = Arc::clone(&state);
        async move { state.players().is_online("Steve") }
    })
    .await;

    let server = running
        .outbound
        .fetch_player_server(&PlayerRef::username("Steve"), Some(Duration::from_millis(100)))
        .await;
    assert_eq!(server.as_deref(), Some("lobby"));
}

#[tokio::test]
async fn test_fetch_player_server_asks_when_several_servers() {
    let running = start().await;
    let mut ws = connect(&running.addr).await;
    authenticate(&running, &mut ws, &["lobby", "survival"]).await;
    send_json(
        &mut ws,
        json!({"action": "player-status-check", "username": "Steve", "online": true}),
    )
    .await;
    let state = Arc::clone(&running.state);
    wait_until(|| {
        let state = Arc::clone(&state);
        async move { state.players().is_online("Steve") }
    })
    .await;

    let outbound = running.outbound.clone();
    let fetch = tokio::spawn(async move {
        outbound
            .fetch_player_server(&PlayerRef::username("Steve"), Some(Duration::from_millis(300)))
            .await
    });

    let query = next_json(&mut ws).await;
    assert_eq!(query["action"], "player-server-check");
    send_json(
        &mut ws,
        json!({"action": "player-server-check", "username": "Steve", "server": "survival"}),
    )
    .await;

    assert_eq!(fetch.await.unwrap().as_deref(), Some("survival"));
}

#[tokio::test]
async fn test_dispatch_command_checks_server_name() {
    let running = start().await;
    let mut ws = connect(&running.addr).await;
    authenticate(&running, &mut ws, &["lobby"]).await;

    let err = running
        .outbound
        .dispatch_command("creative", vec!["say hi".into()])
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Protocol(_)), "{err}");

    let sent = running
        .outbound
        .dispatch_command("lobby", vec!["say hi".into()])
        .await
        .unwrap();
    assert!(sent);
    let frame = next_json(&mut ws).await;
    assert_eq!(
        frame,
        json!({"action": "dispatch-command", "server": "lobby", "commands": ["say hi"]})
    );
}

#[tokio::test]
async fn test_global_and_server_messages_reach_peer() {
    let running = start().await;
    let mut ws = connect(&running.addr).await;
    authenticate(&running, &mut ws, &["lobby"]).await;

    assert!(
        running
            .outbound
            .send_global_message(MessageType::Announce, "Restart in 5")
            .await
    );
    let frame = next_json(&mut ws).await;
    assert_eq!(frame["action"], "send-global-message");
    assert_eq!(frame["message_type"], "ANNOUNCE");

    assert!(
        running
            .outbound
            .send_server_message("all", MessageType::Info, "hello")
            .await
            .unwrap()
    );
    assert_eq!(next_json(&mut ws).await["server"], "all");
}

#[tokio::test]
async fn test_command_executed_frame_names_bridge() {
    let running = start().await;
    let mut ws = connect(&running.addr).await;
    authenticate(&running, &mut ws, &["lobby"]).await;

    let args = BTreeMap::from([("target".to_string(), "Steve".to_string())]);
    assert!(running.outbound.command_executed("kick", args).await);

    let frame = next_json(&mut ws).await;
    assert_eq!(frame["action"], "command-executed");
    assert_eq!(frame["server"], "all");
    assert_eq!(frame["executor"], "bridgeward");
    assert_eq!(frame["args"]["target"], "Steve");
}

// =========================================================================
// Command sync
// =========================================================================

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl ModerationBackend for Recorder {
    async fn timeout(
        &self,
        user: UserId,
        duration: Duration,
        _reason: Option<&str>,
    ) -> Result<(), ModerationError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("timeout {user} {}", duration.as_secs()));
        Ok(())
    }

    async fn clear_timeout(&self, user: UserId) -> Result<(), ModerationError> {
        self.calls.lock().unwrap().push(format!("clear {user}"));
        Ok(())
    }

    async fn ban(&self, user: UserId, _reason: Option<&str>) -> Result<(), ModerationError> {
        self.calls.lock().unwrap().push(format!("ban {user}"));
        Ok(())
    }

    async fn unban(&self, user: UserId) -> Result<(), ModerationError> {
        self.calls.lock().unwrap().push(format!("unban {user}"));
        Ok(())
    }

    async fn kick(&self, user: UserId, _reason: Option<&str>) -> Result<(), ModerationError> {
        self.calls.lock().unwrap().push(format!("kick {user}"));
        Ok(())
    }
}

#[tokio::test]
async fn test_command_executed_timeout_is_scheduled() {
    let recorder = Arc::new(Recorder::default());
    let scheduler = PunishmentScheduler::new(
        Arc::new(InMemoryPunishmentStore::new()),
        Arc::clone(&recorder) as Arc<dyn ModerationBackend>,
    );
    let links = StaticAccountLinks::new()
        .link(UserId::new(1), "Mod", "u-mod")
        .link(UserId::new(2), "Steve", "u-steve");
    let sync = Arc::new(PunishmentSync::new(
        scheduler.clone(),
        CommandSyncPolicy::all(),
        Arc::new(links),
    ));

    let running = start_with(config(), Some(sync)).await;
    let mut ws = connect(&running.addr).await;
    authenticate(&running, &mut ws, &["lobby"]).await;

    send_json(
        &mut ws,
        json!({
            "action": "command-executed",
            "server": "lobby",
            "command_type": "timeout",
            "executor": "Mod",
            "args": {"target": "Steve", "duration": "1h"}
        }),
    )
    .await;

    let watched = scheduler.clone();
    wait_until(|| {
        let watched = watched.clone();
        async move { watched.is_scheduled(UserId::new(2), PunishmentKind::Timeout) }
    })
    .await;
    assert_eq!(recorder.calls.lock().unwrap().as_slice(), ["timeout 2 3600"]);

    scheduler.shutdown();
}

#[tokio::test]
async fn test_command_executed_without_sync_is_ignored() {
    let running = start().await;
    let mut ws = connect(&running.addr).await;
    authenticate(&running, &mut ws, &["lobby"]).await;

    send_json(
        &mut ws,
        json!({
            "action": "command-executed",
            "server": "lobby",
            "command_type": "kick",
            "executor": "Mod",
            "args": {"target": "Steve"}
        }),
    )
    .await;
    send_json(
        &mut ws,
        json!({"action": "player-status-check", "username": "Steve", "online": true}),
    )
    .await;

    let state = Arc::clone(&running.state);
    wait_until(|| {
        let state = Arc::clone(&state);
        async move { state.players().is_online("Steve") }
    })
    .await;
}
