//! Codec trait and implementations for serializing/deserializing frames.
//!
//! A "codec" (coder/decoder) converts between Rust types and what travels
//! on the socket. The bridge speaks JSON text frames, so encoding produces
//! a `String` (sent as a WebSocket text frame) while decoding accepts raw
//! bytes (the transport hands over whatever frame type arrived).

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to frame text and decode bytes back.
///
/// ## Trait bounds explained
///
/// - `Send + Sync` → safe to share between the listener tasks and the
///   outbound API, which may run on different runtime threads.
/// - `'static` → the codec owns everything it needs, so it can live in
///   the long-lived bridge state.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into frame text.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Deserializes a received frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use bridgeward_protocol::{Codec, JsonCodec, SendGlobalMessage, MessageType, frame};
///
/// let codec = JsonCodec;
/// let msg = SendGlobalMessage {
///     message_type: MessageType::Announce,
///     message: "Restart in 5 minutes".into(),
/// };
///
/// let text = codec.encode(&frame(&msg)).unwrap();
/// assert!(text.starts_with(r#"{"action":"send-global-message""#));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
