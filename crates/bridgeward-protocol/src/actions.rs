//! Payload schemas for every action the bridge sends or receives.
//!
//! Direction is a convention, not a type-level rule: the same struct is
//! used to decode an inbound frame and to encode an outbound one.
//!
//! | Action                | Peer → bridge | Bridge → peer |
//! |-----------------------|:-------------:|:-------------:|
//! | `authenticate`        | ✓             | ✓ (handshake) |
//! | `player-status-check` | ✓ (reply)     | ✓ (query)     |
//! | `player-server-check` | ✓ (reply)     | ✓ (query)     |
//! | `command-executed`    | ✓ (event)     | ✓ (mirror)    |
//! | `dispatch-command`    |               | ✓             |
//! | `send-global-message` |               | ✓             |
//! | `send-server-message` |               | ✓             |
//! | `send-player-message` |               | ✓             |

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::envelope::{ActionSchema, ServerLookup, validate_server};
use crate::types::{MAX_USERNAME_LEN, MAX_UUID_LEN, MessageType, PlayerKey};
use crate::ProtocolError;

/// Shared "username and/or uuid" rule.
fn validate_player(
    action: &'static str,
    username: Option<&str>,
    uuid: Option<&str>,
) -> Result<(), ProtocolError> {
    if username.is_none() && uuid.is_none() {
        return Err(ProtocolError::validation(
            action,
            "either 'username' or 'uuid' must be provided",
        ));
    }
    if let Some(name) = username {
        if name.chars().count() > MAX_USERNAME_LEN {
            return Err(ProtocolError::validation(
                action,
                format!("username longer than {MAX_USERNAME_LEN} characters"),
            ));
        }
    }
    if let Some(id) = uuid {
        if id.chars().count() > MAX_UUID_LEN {
            return Err(ProtocolError::validation(
                action,
                format!("uuid longer than {MAX_UUID_LEN} characters"),
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// authenticate
// ---------------------------------------------------------------------------

/// The handshake. A peer must send this (with the shared secret) before
/// anything else is accepted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authenticate {
    pub password: String,
    /// The game servers reachable through this peer, e.g. `["lobby"]`.
    pub server_list: Vec<String>,
}

impl ActionSchema for Authenticate {
    const ACTION: &'static str = "authenticate";
}

// Keep the secret out of logs.
impl fmt::Debug for Authenticate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticate")
            .field("password", &"<redacted>")
            .field("server_list", &self.server_list)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// player-status-check / player-server-check
// ---------------------------------------------------------------------------

/// Query (outbound, `online` absent) or reply (inbound, `online` set).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PlayerStatusCheck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,
}

impl PlayerStatusCheck {
    /// An outbound query about one player.
    pub fn query(player: PlayerKey) -> Self {
        let (username, uuid) = player.into_fields();
        Self {
            username,
            uuid,
            online: None,
        }
    }
}

impl ActionSchema for PlayerStatusCheck {
    const ACTION: &'static str = "player-status-check";

    fn validate(&self, _servers: &dyn ServerLookup) -> Result<(), ProtocolError> {
        validate_player(Self::ACTION, self.username.as_deref(), self.uuid.as_deref())
    }
}

/// Query (outbound, `server` absent) or reply (inbound, `server` set).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PlayerServerCheck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

impl PlayerServerCheck {
    pub fn query(player: PlayerKey) -> Self {
        let (username, uuid) = player.into_fields();
        Self {
            username,
            uuid,
            server: None,
        }
    }
}

impl ActionSchema for PlayerServerCheck {
    const ACTION: &'static str = "player-server-check";

    fn validate(&self, _servers: &dyn ServerLookup) -> Result<(), ProtocolError> {
        validate_player(Self::ACTION, self.username.as_deref(), self.uuid.as_deref())
    }
}

// ---------------------------------------------------------------------------
// command-executed
// ---------------------------------------------------------------------------

/// A moderation command ran on one side and the other side should know.
///
/// `args` is free-form; the punishment commands use `target`, `duration`
/// and `reason`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandExecuted {
    pub server: String,
    pub command_type: String,
    pub executor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<BTreeMap<String, String>>,
}

impl CommandExecuted {
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args.as_ref()?.get(name).map(String::as_str)
    }
}

impl ActionSchema for CommandExecuted {
    const ACTION: &'static str = "command-executed";

    fn validate(&self, servers: &dyn ServerLookup) -> Result<(), ProtocolError> {
        validate_server(Self::ACTION, &self.server, servers)
    }
}

// ---------------------------------------------------------------------------
// dispatch-command
// ---------------------------------------------------------------------------

/// Run console commands on a game server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchCommand {
    pub server: String,
    /// Accepts `"say hi"` or `["say hi", "save-all"]` on input; always
    /// a list after decoding.
    #[serde(deserialize_with = "one_or_many")]
    pub commands: Vec<String>,
}

impl ActionSchema for DispatchCommand {
    const ACTION: &'static str = "dispatch-command";

    fn validate(&self, servers: &dyn ServerLookup) -> Result<(), ProtocolError> {
        validate_server(Self::ACTION, &self.server, servers)
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

// ---------------------------------------------------------------------------
// chat messages
// ---------------------------------------------------------------------------

/// Broadcast to every player on every server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendGlobalMessage {
    pub message_type: MessageType,
    pub message: String,
}

impl ActionSchema for SendGlobalMessage {
    const ACTION: &'static str = "send-global-message";
}

/// Broadcast to every player on one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendServerMessage {
    pub server: String,
    pub message_type: MessageType,
    pub message: String,
}

impl ActionSchema for SendServerMessage {
    const ACTION: &'static str = "send-server-message";

    fn validate(&self, servers: &dyn ServerLookup) -> Result<(), ProtocolError> {
        validate_server(Self::ACTION, &self.server, servers)
    }
}

/// Message a single player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendPlayerMessage {
    pub message_type: MessageType,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

impl SendPlayerMessage {
    pub fn to_player(
        player: PlayerKey,
        message_type: MessageType,
        message: impl Into<String>,
    ) -> Self {
        let (username, uuid) = player.into_fields();
        Self {
            message_type,
            message: message.into(),
            username,
            uuid,
        }
    }
}

impl ActionSchema for SendPlayerMessage {
    const ACTION: &'static str = "send-player-message";

    fn validate(&self, _servers: &dyn ServerLookup) -> Result<(), ProtocolError> {
        validate_player(Self::ACTION, self.username.as_deref(), self.uuid.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Codec, JsonCodec, NoServers, RawFrame, frame};
    use serde_json::json;

    /// Knows exactly one server, "lobby".
    struct Lobby;

    impl ServerLookup for Lobby {
        fn is_advertised(&self, server: &str) -> bool {
            server == "lobby"
        }
    }

    fn fields(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("test payload must be an object"),
        }
    }

    #[test]
    fn test_authenticate_decodes_from_raw_frame() {
        let raw: RawFrame = JsonCodec
            .decode(br#"{"action":"authenticate","password":"p","server_list":["lobby"]}"#)
            .unwrap();
        let auth = Authenticate::from_fields(raw.fields, &NoServers).unwrap();
        assert_eq!(auth.password, "p");
        assert_eq!(auth.server_list, vec!["lobby"]);
    }

    #[test]
    fn test_authenticate_debug_hides_password() {
        let auth = Authenticate {
            password: "hunter2".into(),
            server_list: vec![],
        };
        assert!(!format!("{auth:?}").contains("hunter2"));
    }

    #[test]
    fn test_player_status_check_requires_username_or_uuid() {
        let err = PlayerStatusCheck::from_fields(fields(json!({"online": true})), &NoServers)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Validation { action: "player-status-check", .. }));
    }

    #[test]
    fn test_player_status_check_rejects_long_username() {
        let result = PlayerStatusCheck::from_fields(
            fields(json!({"username": "a_name_that_is_too_long"})),
            &NoServers,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_player_status_check_query_omits_absent_fields() {
        let query = PlayerStatusCheck::query(PlayerKey::Username("Steve".into()));
        let text = JsonCodec.encode(&frame(&query)).unwrap();
        assert_eq!(text, r#"{"action":"player-status-check","username":"Steve"}"#);
    }

    #[test]
    fn test_player_server_check_reply_with_uuid_only() {
        let reply = PlayerServerCheck::from_fields(
            fields(json!({"uuid": "u-1", "server": "lobby"})),
            &NoServers,
        )
        .unwrap();
        assert_eq!(reply.server.as_deref(), Some("lobby"));
    }

    #[test]
    fn test_command_executed_unknown_server_rejected() {
        let payload = json!({
            "server": "survival",
            "command_type": "kick",
            "executor": "Alex",
        });
        let err = CommandExecuted::from_fields(fields(payload.clone()), &Lobby).unwrap_err();
        assert!(err.to_string().contains("survival"));

        let mut ok = payload;
        ok["server"] = json!("lobby");
        assert!(CommandExecuted::from_fields(fields(ok), &Lobby).is_ok());
    }

    #[test]
    fn test_command_executed_arg_lookup() {
        let cmd = CommandExecuted::from_fields(
            fields(json!({
                "server": "all",
                "command_type": "tempban",
                "executor": "Alex",
                "args": {"target": "Steve", "duration": "1d"},
            })),
            &NoServers,
        )
        .unwrap();
        assert_eq!(cmd.arg("target"), Some("Steve"));
        assert_eq!(cmd.arg("reason"), None);
    }

    #[test]
    fn test_dispatch_command_single_string_normalized_to_list() {
        let cmd = DispatchCommand::from_fields(
            fields(json!({"server": "all", "commands": "say hi"})),
            &NoServers,
        )
        .unwrap();
        assert_eq!(cmd.commands, vec!["say hi"]);

        let text = JsonCodec.encode(&frame(&cmd)).unwrap();
        assert!(text.contains(r#""commands":["say hi"]"#));
    }

    #[test]
    fn test_dispatch_command_list_kept() {
        let cmd = DispatchCommand::from_fields(
            fields(json!({"server": "velocity", "commands": ["a", "b"]})),
            &NoServers,
        )
        .unwrap();
        assert_eq!(cmd.commands.len(), 2);
    }

    #[test]
    fn test_send_server_message_unknown_message_type_is_decode_error() {
        let err = SendServerMessage::from_fields(
            fields(json!({"server": "all", "message_type": "SHOUT", "message": "x"})),
            &NoServers,
        )
        .unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn test_send_player_message_wire_shape() {
        let msg = SendPlayerMessage::to_player(
            PlayerKey::Username("Steve".into()),
            MessageType::Info,
            "hello",
        );
        let value: serde_json::Value =
            serde_json::from_str(&JsonCodec.encode(&frame(&msg)).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "action": "send-player-message",
                "message_type": "INFO",
                "message": "hello",
                "username": "Steve",
            })
        );
    }
}
