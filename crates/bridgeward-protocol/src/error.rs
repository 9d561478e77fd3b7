//! Error types for the protocol layer.
//!
//! Every variant here is a *validation* failure from the listener's point
//! of view: the frame gets logged and dropped, and the connection stays
//! open. Nothing in this enum ever closes a socket.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into JSON text).
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// The frame isn't valid JSON, or a field has the wrong type.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The frame is a JSON object but has no `action` field.
    #[error("frame has no action field")]
    MissingAction,

    /// The `action` names something nobody registered.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// The payload decoded but broke one of the action's rules, e.g.
    /// neither `username` nor `uuid` given, or an unknown server name.
    #[error("invalid {action} payload: {reason}")]
    Validation {
        action: &'static str,
        reason: String,
    },
}

impl ProtocolError {
    pub(crate) fn validation(
        action: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::Validation {
            action,
            reason: reason.into(),
        }
    }
}
