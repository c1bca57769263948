//! Codec trait and the JSON implementation.
//!
//! The hub never calls `serde_json` directly; it goes through a [`Codec`]
//! so the wire format stays a single swappable piece.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Converts typed messages to text frames and raw frames back to types.
///
/// ## Trait bounds
///
/// - `Send + Sync` → the codec is shared by the hub task and tests.
/// - `'static` → it owns everything it needs, so it can live inside
///   long-running tasks.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a UTF-8 text frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value can't be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Deserializes a raw frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or
    /// don't match the expected shape.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use huddle_protocol::{ChatEvent, Codec, JsonCodec, ServerEvent};
///
/// let text = JsonCodec.encode(&ChatEvent::from(ServerEvent::Ping)).unwrap();
/// assert_eq!(text, r#"{"type":"ping"}"#);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
