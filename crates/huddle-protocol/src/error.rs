//! Error types for the protocol layer.
//!
//! Anything that goes wrong turning a frame into a typed message (or
//! back) ends up here. The server treats every variant as "drop this
//! one frame"; none of them is fatal for the connection.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization of an outbound event failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// The frame is not valid JSON, or a field has the wrong type.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The frame parsed but breaks a protocol rule, e.g. a `message`
    /// whose `data` is not an object.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
