//! Unified error type for the Huddle server.

use std::fmt;

use huddle_presence::PresenceError;
use huddle_protocol::ProtocolError;
use huddle_transport::TransportError;

use crate::config::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each wrapping variant generates the `From`
/// impl, so `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum HuddleError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A presence-level error (name taken, already signed in).
    #[error(transparent)]
    Presence(#[from] PresenceError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The handshake carried an `Origin` outside the whitelist, or none.
    #[error("origin not allowed: {}", .0.as_deref().unwrap_or("<none>"))]
    OriginRejected(Option<String>),

    /// The hub task has stopped and no longer accepts commands.
    #[error("hub is not running")]
    HubUnavailable,
}

/// Why a connection left the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The transport closed: peer hang-up, read error, or write error.
    Closed,
    /// The connection missed a liveness probe and was terminated.
    LivenessTimeout,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Closed => f.write_str("closed"),
            DisconnectReason::LivenessTimeout => f.write_str("liveness timeout"),
        }
    }
}

#[cfg(test)]
mod tests {
    use huddle_transport::ConnectionId;

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let huddle_err: HuddleError = err.into();
        assert!(matches!(huddle_err, HuddleError::Transport(_)));
        assert!(huddle_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let huddle_err: HuddleError = err.into();
        assert!(matches!(huddle_err, HuddleError::Protocol(_)));
    }

    #[test]
    fn test_from_presence_error() {
        let err = PresenceError::AlreadySignedIn {
            conn: ConnectionId::new(1),
            name: "alice".into(),
        };
        let huddle_err: HuddleError = err.into();
        assert!(matches!(huddle_err, HuddleError::Presence(_)));
    }

    #[test]
    fn test_from_config_error() {
        let err = ConfigError::MissingEnv("HUDDLE_ORIGINS");
        let huddle_err: HuddleError = err.into();
        assert!(matches!(huddle_err, HuddleError::Config(_)));
        assert!(huddle_err.to_string().contains("HUDDLE_ORIGINS"));
    }

    #[test]
    fn test_origin_rejected_display() {
        let named = HuddleError::OriginRejected(Some("http://evil.test".into()));
        assert_eq!(named.to_string(), "origin not allowed: http://evil.test");

        let missing = HuddleError::OriginRejected(None);
        assert_eq!(missing.to_string(), "origin not allowed: <none>");
    }

    #[test]
    fn test_disconnect_reason_display() {
        assert_eq!(DisconnectReason::Closed.to_string(), "closed");
        assert_eq!(
            DisconnectReason::LivenessTimeout.to_string(),
            "liveness timeout"
        );
    }
}
