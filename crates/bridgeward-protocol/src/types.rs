//! Small value types shared by several schemas.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest username a game server will accept.
pub const MAX_USERNAME_LEN: usize = 16;

/// Longest UUID string (36 = hyphenated form).
pub const MAX_UUID_LEN: usize = 36;

/// How the game side should style a chat message.
///
/// Serialized in upper case: `"INFO"`, `"ANNOUNCE"`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    #[default]
    Info,
    Success,
    Warn,
    Error,
    Question,
    Announce,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "INFO",
            Self::Success => "SUCCESS",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Question => "QUESTION",
            Self::Announce => "ANNOUNCE",
        };
        f.write_str(s)
    }
}

/// Who a player-addressed message or query is about.
///
/// The wire format carries this as two optional fields (`username`,
/// `uuid`) with the rule that at least one is present. This type is the
/// typed view of that rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlayerKey {
    Username(String),
    Uuid(String),
}

impl PlayerKey {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Username(s) | Self::Uuid(s) => s,
        }
    }

    /// Splits into the wire's `(username, uuid)` pair.
    pub fn into_fields(self) -> (Option<String>, Option<String>) {
        match self {
            Self::Username(u) => (Some(u), None),
            Self::Uuid(u) => (None, Some(u)),
        }
    }
}

impl fmt::Display for PlayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
