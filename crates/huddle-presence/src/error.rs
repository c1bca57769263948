//! Error types for the presence layer.

use huddle_transport::ConnectionId;

/// Errors from claiming a display name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PresenceError {
    /// Another connection already holds this exact name.
    #[error("username {0} is taken")]
    NameTaken(String),

    /// The connection already signed in; a connection holds at most one
    /// name.
    #[error("{conn} is already signed in as {name}")]
    AlreadySignedIn { conn: ConnectionId, name: String },
}

/// Errors from delivering a frame to one connection.
///
/// These never abort a broadcast; the registry logs them and moves on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No connection with this id is registered.
    #[error("{0} is not registered")]
    NotRegistered(ConnectionId),

    /// The connection's writer has gone away.
    #[error("send to {0} failed: outbox closed")]
    SendFailed(ConnectionId),
}
