//! The action envelope: `{"action": "<name>", ...fields}`.
//!
//! Every frame on the wire is one flat JSON object. The `action` string
//! picks the schema; the remaining keys are that schema's fields. There is
//! no nesting and no request id, so the same shape is used in both
//! directions.
//!
//! ```text
//! {"action":"player-status-check","username":"Steve","online":true}
//!   └─ action ─────────────────┘ └─ payload (PlayerStatusCheck) ─┘
//! ```
//!
//! Decoding happens in two steps. The listener first parses a [`RawFrame`]
//! (just the action name plus an untyped field map) so it can look the
//! action up before knowing the payload type. The registered handler then
//! turns the field map into its schema with [`ActionSchema::from_fields`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ProtocolError;

/// Server names that are always valid targets, whether or not a peer
/// advertised them.
pub const RESERVED_SERVERS: [&str; 3] = ["all", "bungeecord", "velocity"];

/// The broadcast server name. Always merged into the known-server set
/// when a peer authenticates.
pub const ALL_SERVERS: &str = "all";

/// Returns `true` for `all`, `bungeecord`, and `velocity`.
pub fn is_reserved_server(name: &str) -> bool {
    RESERVED_SERVERS.contains(&name)
}

/// Answers "has any authenticated peer advertised this server?".
///
/// Implemented by the session store; schemas with a `server` field use it
/// during validation.
pub trait ServerLookup {
    fn is_advertised(&self, server: &str) -> bool;
}

/// A lookup that knows no servers. Only reserved names pass against it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoServers;

impl ServerLookup for NoServers {
    fn is_advertised(&self, _server: &str) -> bool {
        false
    }
}

/// A frame whose action has been read but whose payload hasn't been
/// interpreted yet.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawFrame {
    /// `None` when the object has no `action` key at all.
    #[serde(default)]
    pub action: Option<String>,
    /// Everything except `action`.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RawFrame {
    /// Returns the action name or [`ProtocolError::MissingAction`].
    pub fn action(&self) -> Result<&str, ProtocolError> {
        self.action.as_deref().ok_or(ProtocolError::MissingAction)
    }
}

/// An outbound frame: the action name followed by the payload's fields.
#[derive(Debug, Serialize)]
pub struct ActionFrame<'a, T> {
    pub action: &'static str,
    #[serde(flatten)]
    pub payload: &'a T,
}

/// Wraps a payload in its envelope, ready for [`Codec::encode`].
///
/// [`Codec::encode`]: crate::Codec::encode
pub fn frame<S: ActionSchema>(payload: &S) -> ActionFrame<'_, S> {
    ActionFrame {
        action: S::ACTION,
        payload,
    }
}

/// A payload type bound to one action name.
///
/// `validate` runs after serde has checked the field types, and holds the
/// rules serde can't express (length limits, "at least one of", known
/// server names). The default accepts everything.
pub trait ActionSchema:
    Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// The wire name, e.g. `"player-status-check"`.
    const ACTION: &'static str;

    fn validate(&self, _servers: &dyn ServerLookup) -> Result<(), ProtocolError> {
        Ok(())
    }

    /// Decodes the payload fields of a [`RawFrame`] and validates them.
    fn from_fields(
        fields: Map<String, Value>,
        servers: &dyn ServerLookup,
    ) -> Result<Self, ProtocolError> {
        let payload: Self = serde_json::from_value(Value::Object(fields))
            .map_err(ProtocolError::Decode)?;
        payload.validate(servers)?;
        Ok(payload)
    }
}

/// Shared rule for schemas with a `server` field.
pub(crate) fn validate_server(
    action: &'static str,
    server: &str,
    servers: &dyn ServerLookup,
) -> Result<(), ProtocolError> {
    if is_reserved_server(server) || servers.is_advertised(server) {
        Ok(())
    } else {
        Err(ProtocolError::validation(
            action,
            format!("server '{server}' is not authenticated"),
        ))
    }
}
