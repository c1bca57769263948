//! The connection registry: every live transport handle, signed in or not.
//!
//! The registry doesn't hold the sockets themselves. Each connection has
//! a writer task draining an unbounded [`Outbox`]; the registry keeps the
//! sending half. Pushing into an outbox never waits, so a slow client
//! can't hold up a broadcast to everyone else.
//!
//! Closing a connection doesn't go through the outbox. A client that
//! stops reading leaves its writer parked on a full socket, and anything
//! queued behind that write would never be seen. Every handle therefore
//! carries a separate one-shot termination signal that the connection
//! task races against its writer.

use std::collections::HashMap;
use std::sync::Arc;

use huddle_transport::{CloseReason, ConnectionId};
use tokio::sync::{mpsc, oneshot};

use crate::RegistryError;

/// Sending half of a connection's outbound frame queue.
pub type Outbox = mpsc::UnboundedSender<Arc<str>>;

/// The registry's side of one connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    outbox: Outbox,
    terminate: oneshot::Sender<CloseReason>,
}

/// The connection task's side: frames to write, and the signal to stop.
///
/// `terminate` resolves with a reason when the hub closes the
/// connection, or with an error once the registry has dropped the handle
/// without closing it.
#[derive(Debug)]
pub struct Mailbox {
    /// Frames in the order they were queued.
    pub frames: mpsc::UnboundedReceiver<Arc<str>>,
    /// Fires once when the connection should be torn down.
    pub terminate: oneshot::Receiver<CloseReason>,
}

/// Creates a connected [`ConnectionHandle`] / [`Mailbox`] pair.
pub fn mailbox() -> (ConnectionHandle, Mailbox) {
    let (outbox, frames) = mpsc::unbounded_channel();
    let (terminate_tx, terminate_rx) = oneshot::channel();
    (
        ConnectionHandle {
            outbox,
            terminate: terminate_tx,
        },
        Mailbox {
            frames,
            terminate: terminate_rx,
        },
    )
}

impl ConnectionHandle {
    fn is_closed(&self) -> bool {
        self.outbox.is_closed()
    }

    fn terminate(self, conn: ConnectionId, reason: CloseReason) {
        if self.terminate.send(reason).is_err() {
            tracing::trace!(%conn, "connection task already gone");
        }
    }
}

/// Tracks every registered connection by id.
///
/// Like the directory, this is a plain map with no locking. It is owned
/// by the hub task, which serializes all access.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    handles: HashMap<ConnectionId, ConnectionHandle>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection. Returns `false` (and keeps the existing
    /// handle) if the id was already registered.
    pub fn register(
        &mut self,
        conn: ConnectionId,
        handle: ConnectionHandle,
    ) -> bool {
        if self.handles.contains_key(&conn) {
            tracing::warn!(%conn, "connection registered twice, ignoring");
            return false;
        }
        self.handles.insert(conn, handle);
        tracing::debug!(%conn, connections = self.handles.len(), "connection registered");
        true
    }

    /// Forgets a connection without signalling it. Returns `false` if it
    /// wasn't registered.
    pub fn unregister(&mut self, conn: ConnectionId) -> bool {
        let removed = self.handles.remove(&conn).is_some();
        if removed {
            tracing::debug!(%conn, connections = self.handles.len(), "connection unregistered");
        }
        removed
    }

    /// Queues one frame for a single connection.
    ///
    /// # Errors
    /// - [`RegistryError::NotRegistered`]: unknown id
    /// - [`RegistryError::SendFailed`]: the writer task has stopped
    pub fn send_to(
        &self,
        conn: ConnectionId,
        frame: Arc<str>,
    ) -> Result<(), RegistryError> {
        let handle = self
            .handles
            .get(&conn)
            .ok_or(RegistryError::NotRegistered(conn))?;
        handle
            .outbox
            .send(frame)
            .map_err(|_| RegistryError::SendFailed(conn))
    }

    /// Queues `frame` for every open connection that satisfies
    /// `predicate`. Returns how many connections it was queued for.
    ///
    /// A failure for one recipient is logged and skipped.
    pub fn broadcast(
        &self,
        frame: &Arc<str>,
        predicate: impl Fn(ConnectionId) -> bool,
    ) -> usize {
        let mut delivered = 0;
        for (&conn, handle) in &self.handles {
            if handle.is_closed() || !predicate(conn) {
                continue;
            }
            match handle.outbox.send(Arc::clone(frame)) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::debug!(%conn, "broadcast skipped closed outbox");
                }
            }
        }
        delivered
    }

    /// Signals the connection task to terminate the transport, then
    /// unregisters it. Returns `false` if it wasn't registered.
    ///
    /// Frames still queued in the outbox are abandoned.
    pub fn close(&mut self, conn: ConnectionId, reason: CloseReason) -> bool {
        match self.handles.remove(&conn) {
            Some(handle) => {
                handle.terminate(conn, reason);
                tracing::debug!(%conn, ?reason, "connection closed by server");
                true
            }
            None => false,
        }
    }

    /// Closes and unregisters every connection. Returns how many there were.
    pub fn close_all(&mut self, reason: CloseReason) -> usize {
        let count = self.handles.len();
        for (conn, handle) in self.handles.drain() {
            handle.terminate(conn, reason);
        }
        count
    }

    /// Whether `conn` is registered.
    pub fn contains(&self, conn: ConnectionId) -> bool {
        self.handles.contains_key(&conn)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::oneshot::error::TryRecvError;

    use super::*;

    fn cid(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    fn frame(text: &str) -> Arc<str> {
        Arc::from(text)
    }

    fn drain(mailbox: &mut Mailbox) -> Vec<Arc<str>> {
        let mut out = Vec::new();
        while let Ok(frame) = mailbox.frames.try_recv() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn test_register_and_unregister() {
        let mut reg = ConnectionRegistry::new();
        let (handle, _mailbox) = mailbox();

        assert!(reg.register(cid(1), handle));
        assert!(reg.contains(cid(1)));
        assert_eq!(reg.len(), 1);

        assert!(reg.unregister(cid(1)));
        assert!(!reg.unregister(cid(1)), "second unregister is a no-op");
        assert!(reg.is_empty());
    }

    #[test]
    fn test_unregister_does_not_signal_termination() {
        let mut reg = ConnectionRegistry::new();
        let (handle, mut mb) = mailbox();
        reg.register(cid(1), handle);

        reg.unregister(cid(1));

        assert_eq!(mb.terminate.try_recv(), Err(TryRecvError::Closed));
    }

    #[test]
    fn test_register_twice_keeps_first_handle() {
        let mut reg = ConnectionRegistry::new();
        let (h1, mut mb1) = mailbox();
        let (h2, mut mb2) = mailbox();

        assert!(reg.register(cid(1), h1));
        assert!(!reg.register(cid(1), h2));

        reg.send_to(cid(1), frame("x")).unwrap();
        assert_eq!(drain(&mut mb1).len(), 1);
        assert!(drain(&mut mb2).is_empty());
    }

    #[test]
    fn test_send_to_unknown_is_not_registered() {
        let reg = ConnectionRegistry::new();
        assert_eq!(
            reg.send_to(cid(9), frame("x")),
            Err(RegistryError::NotRegistered(cid(9)))
        );
    }

    #[test]
    fn test_send_to_closed_outbox_fails() {
        let mut reg = ConnectionRegistry::new();
        let (handle, mb) = mailbox();
        reg.register(cid(1), handle);
        drop(mb);

        assert_eq!(
            reg.send_to(cid(1), frame("x")),
            Err(RegistryError::SendFailed(cid(1)))
        );
    }

    #[test]
    fn test_broadcast_respects_predicate() {
        let mut reg = ConnectionRegistry::new();
        let (h1, mut mb1) = mailbox();
        let (h2, mut mb2) = mailbox();
        reg.register(cid(1), h1);
        reg.register(cid(2), h2);

        let delivered = reg.broadcast(&frame("hello"), |c| c == cid(2));

        assert_eq!(delivered, 1);
        assert!(drain(&mut mb1).is_empty());
        assert_eq!(drain(&mut mb2), vec![frame("hello")]);
    }

    #[test]
    fn test_broadcast_isolates_dead_recipient() {
        // One closed outbox must not stop delivery to the others.
        let mut reg = ConnectionRegistry::new();
        let (h1, mb1) = mailbox();
        let (h2, mut mb2) = mailbox();
        let (h3, mut mb3) = mailbox();
        reg.register(cid(1), h1);
        reg.register(cid(2), h2);
        reg.register(cid(3), h3);
        drop(mb1);

        let delivered = reg.broadcast(&frame("hi"), |_| true);

        assert_eq!(delivered, 2);
        assert_eq!(drain(&mut mb2).len(), 1);
        assert_eq!(drain(&mut mb3).len(), 1);
    }

    #[test]
    fn test_broadcast_preserves_per_connection_order() {
        let mut reg = ConnectionRegistry::new();
        let (handle, mut mb) = mailbox();
        reg.register(cid(1), handle);

        reg.broadcast(&frame("first"), |_| true);
        reg.send_to(cid(1), frame("second")).unwrap();
        reg.broadcast(&frame("third"), |_| true);

        assert_eq!(
            drain(&mut mb),
            vec![frame("first"), frame("second"), frame("third")]
        );
    }

    #[test]
    fn test_close_signals_past_queued_frames() {
        // The signal must not wait behind a backlog the peer never reads.
        let mut reg = ConnectionRegistry::new();
        let (handle, mut mb) = mailbox();
        reg.register(cid(1), handle);
        for _ in 0..100 {
            reg.send_to(cid(1), frame("backlog")).unwrap();
        }

        assert!(reg.close(cid(1), CloseReason::Unresponsive));

        assert_eq!(mb.terminate.try_recv(), Ok(CloseReason::Unresponsive));
        assert!(!reg.contains(cid(1)));
        assert!(!reg.close(cid(1), CloseReason::Unresponsive));
    }

    #[test]
    fn test_close_after_task_exit_is_harmless() {
        let mut reg = ConnectionRegistry::new();
        let (handle, mb) = mailbox();
        reg.register(cid(1), handle);
        drop(mb);

        assert!(reg.close(cid(1), CloseReason::Normal));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_close_all_empties_registry() {
        let mut reg = ConnectionRegistry::new();
        let (h1, mut mb1) = mailbox();
        let (h2, mut mb2) = mailbox();
        reg.register(cid(1), h1);
        reg.register(cid(2), h2);

        assert_eq!(reg.close_all(CloseReason::Normal), 2);
        assert!(reg.is_empty());
        assert_eq!(mb1.terminate.try_recv(), Ok(CloseReason::Normal));
        assert_eq!(mb2.terminate.try_recv(), Ok(CloseReason::Normal));
    }
}
