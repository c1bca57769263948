//! Transport abstraction layer for Huddle.
//!
//! Provides the [`Transport`], [`Handshake`] and [`Connection`] traits that
//! abstract over the network protocol carrying chat frames.
//!
//! # Feature Flags
//!
//! - `websocket` (default) — WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    WebSocketConnection, WebSocketHandshake, WebSocketTransport,
};

use std::fmt;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Why the server is closing a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Ordinary close, e.g. the server is shutting down.
    Normal,
    /// The peer broke a server policy. Carries a short reason string
    /// that is sent in the close frame.
    PolicyViolation(&'static str),
    /// The peer stopped answering liveness probes.
    Unresponsive,
}

/// Accepts new incoming connections.
///
/// Accepting only takes the socket; the protocol handshake runs later via
/// [`Handshake::complete`], so the accept loop never waits on a slow peer.
pub trait Transport: Send + Sync + 'static {
    /// An accepted socket whose handshake hasn't run yet.
    type Handshake: Handshake;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming socket.
    async fn accept(&mut self) -> Result<Self::Handshake, Self::Error>;

    /// Returns the address the transport is listening on.
    fn local_addr(&self) -> std::io::Result<std::net::SocketAddr>;
}

/// The pending handshake of one accepted socket.
pub trait Handshake: Send + 'static {
    /// The connection produced once the handshake succeeds.
    type Connection: Connection;
    /// The error type for the handshake.
    type Error: std::error::Error + Send + Sync;

    /// Runs the handshake. Implementations bound how long it may take.
    async fn complete(self) -> Result<Self::Connection, Self::Error>;

    /// The remote address of the socket.
    fn peer_addr(&self) -> std::net::SocketAddr;
}

/// A single connection that carries UTF-8 text frames.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one text frame to the remote peer.
    async fn send(&self, text: &str) -> Result<(), Self::Error>;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Closes the connection with the given reason.
    async fn close(&self, reason: CloseReason) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// The `Origin` the client declared when it connected, if any.
    fn origin(&self) -> Option<&str>;
}
