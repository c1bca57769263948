//! Per-connection handler: handshake, origin check, writer, and reader.
//!
//! Each accepted socket gets its own Tokio task running this handler.
//! The flow is:
//!   1. Finish the WebSocket upgrade, off the accept loop
//!   2. Check the handshake's `Origin` against the whitelist
//!   3. Register with the hub, handing it the connection's handle
//!   4. Drain the outbox to the socket while forwarding inbound frames
//!      to the hub, until either side stops or the hub terminates the
//!      connection
//!   5. Tell the hub the connection is gone

use std::sync::Arc;
use std::time::Duration;

use huddle_presence::Mailbox;
use huddle_transport::{
    CloseReason, Connection, ConnectionId, Handshake, TransportError,
    WebSocketConnection, WebSocketHandshake,
};
use tokio::sync::mpsc;

use crate::config::OriginWhitelist;
use crate::hub::HubHandle;
use crate::HuddleError;

/// Close reason sent to clients whose origin isn't whitelisted.
pub(crate) const ORIGIN_NOT_ALLOWED: &str = "origin not allowed";

/// How long a terminated connection gets to take its last frames and
/// the close frame before the socket is dropped.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Drop guard that reports the connection to the hub when the handler
/// exits.
///
/// This runs the hub's cleanup even if the handler panics. Since `Drop`
/// is synchronous, it spawns a fire-and-forget task for the send.
struct DisconnectGuard {
    conn_id: ConnectionId,
    hub: HubHandle,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let hub = self.hub.clone();
        tokio::spawn(async move {
            // Fails only once the hub has shut down, which already
            // dropped every connection.
            let _ = hub.disconnect(conn_id).await;
        });
    }
}

/// Handles a single connection from the upgrade to close.
pub(crate) async fn handle_connection(
    handshake: WebSocketHandshake,
    hub: HubHandle,
    origins: Arc<OriginWhitelist>,
) -> Result<(), HuddleError> {
    let peer = handshake.peer_addr();
    let conn = handshake.complete().await.inspect_err(|e| {
        tracing::debug!(%peer, error = %e, "handshake failed");
    })?;
    let conn_id = conn.id();

    if !origins.allows(conn.origin()) {
        tracing::warn!(%conn_id, origin = ?conn.origin(), "origin rejected");
        let origin = conn.origin().map(str::to_owned);
        if let Err(e) = conn
            .close(CloseReason::PolicyViolation(ORIGIN_NOT_ALLOWED))
            .await
        {
            tracing::debug!(%conn_id, error = %e, "close after origin rejection failed");
        }
        return Err(HuddleError::OriginRejected(origin));
    }

    tracing::debug!(%conn_id, %peer, origin = ?conn.origin(), "connection accepted");

    let (handle, mailbox) = huddle_presence::mailbox();
    let Mailbox {
        frames: mut outbound,
        mut terminate,
    } = mailbox;
    hub.connect(conn_id, handle).await?;
    let _guard = DisconnectGuard {
        conn_id,
        hub: hub.clone(),
    };

    // Whichever branch finishes first cancels the others. The writer may
    // be parked on a peer that stopped reading, so termination can't be
    // queued behind it.
    let reason = tokio::select! {
        biased;
        signal = &mut terminate => signal.ok(),
        result = read_loop(&conn, &hub) => {
            result?;
            None
        }
        () = write_loop(&conn, &mut outbound) => None,
    };
    // The hub drops the outbox right after signalling, so a writer that
    // just ran dry may have beaten the signal here.
    let reason = reason.or_else(|| terminate.try_recv().ok());

    if let Some(reason) = reason {
        shut_down(&conn, &mut outbound, reason).await;
    }

    // _guard drops here → hub disconnect fires.
    Ok(())
}

/// Forwards inbound frames to the hub until the peer goes away.
async fn read_loop(
    conn: &WebSocketConnection,
    hub: &HubHandle,
) -> Result<(), HuddleError> {
    let conn_id = conn.id();
    loop {
        match conn.recv().await {
            Ok(Some(data)) => hub.frame(conn_id, data).await?,
            Ok(None) => {
                tracing::debug!(%conn_id, "connection closed by peer");
                return Ok(());
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                return Ok(());
            }
        }
    }
}

/// Writes queued frames until the hub drops the outbox or a write fails.
async fn write_loop(
    conn: &WebSocketConnection,
    outbound: &mut mpsc::UnboundedReceiver<Arc<str>>,
) {
    let conn_id = conn.id();
    while let Some(text) = outbound.recv().await {
        if let Err(e) = conn.send(&text).await {
            tracing::debug!(%conn_id, error = %e, "send error");
            return;
        }
    }
}

/// Writes whatever is already queued plus a close frame, giving up after
/// [`CLOSE_TIMEOUT`]. The socket is dropped by the caller either way.
async fn shut_down(
    conn: &WebSocketConnection,
    outbound: &mut mpsc::UnboundedReceiver<Arc<str>>,
    reason: CloseReason,
) {
    let conn_id = conn.id();
    let flush = flush_and_close(conn, outbound, reason);

    match tokio::time::timeout(CLOSE_TIMEOUT, flush).await {
        Ok(Ok(())) => {
            tracing::debug!(%conn_id, ?reason, "connection terminated");
        }
        Ok(Err(e)) => {
            tracing::debug!(%conn_id, ?reason, error = %e, "close error");
        }
        Err(_) => {
            tracing::warn!(
                %conn_id,
                ?reason,
                "peer not reading, dropping socket without close frame"
            );
        }
    }
}

/// Sends every frame already in `outbound`, then the close frame.
async fn flush_and_close(
    conn: &WebSocketConnection,
    outbound: &mut mpsc::UnboundedReceiver<Arc<str>>,
    reason: CloseReason,
) -> Result<(), TransportError> {
    while let Ok(text) = outbound.try_recv() {
        conn.send(&text).await?;
    }
    conn.close(reason).await
}
