//! The hub: one task that owns every piece of shared chat state.
//!
//! The [`ConnectionRegistry`], [`PresenceDirectory`] and
//! [`LivenessMonitor`] live inside a single actor. Connection handlers
//! talk to it through a [`HubHandle`]; commands are processed one at a
//! time, interleaved with probe rounds, in a `tokio::select!` loop. So a
//! claim's check-and-insert and a release plus its `userLeaveChat` are
//! each a single step that nothing else can observe half-done.

use std::sync::Arc;

use huddle_liveness::{LivenessConfig, LivenessMonitor};
use huddle_presence::{ConnectionHandle, ConnectionRegistry, PresenceDirectory};
use huddle_protocol::{ChatEvent, Codec, JsonCodec, ServerEvent, UserProfile};
use huddle_transport::{CloseReason, ConnectionId};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::{DisconnectReason, HuddleError};

/// Capacity of the hub's command channel.
const COMMAND_BUFFER: usize = 1024;

/// Commands sent to the hub task.
pub(crate) enum HubCommand {
    /// A connection passed the origin check and has a running writer.
    Connect {
        conn_id: ConnectionId,
        handle: ConnectionHandle,
    },

    /// One inbound text frame, undecoded.
    Frame { conn_id: ConnectionId, data: Vec<u8> },

    /// The connection's transport is gone.
    Disconnect { conn_id: ConnectionId },

    /// Request a snapshot of the hub.
    Stats { reply: oneshot::Sender<HubStats> },

    /// Close every connection and stop.
    Shutdown,
}

/// A snapshot of who is connected and who is signed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubStats {
    /// Registered connections, signed in or not.
    pub connections: usize,
    /// Signed-in users in sign-in order.
    pub users: Vec<UserProfile>,
}

/// Handle to the running hub. Cheap to clone.
#[derive(Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Registers a connection. Frames and the termination signal for it
    /// go through `handle`.
    pub async fn connect(
        &self,
        conn_id: ConnectionId,
        handle: ConnectionHandle,
    ) -> Result<(), HuddleError> {
        self.send(HubCommand::Connect { conn_id, handle }).await
    }

    /// Forwards one inbound frame.
    pub async fn frame(
        &self,
        conn_id: ConnectionId,
        data: Vec<u8>,
    ) -> Result<(), HuddleError> {
        self.send(HubCommand::Frame { conn_id, data }).await
    }

    /// Reports a closed connection. Safe to call more than once.
    pub async fn disconnect(
        &self,
        conn_id: ConnectionId,
    ) -> Result<(), HuddleError> {
        self.send(HubCommand::Disconnect { conn_id }).await
    }

    /// Requests a snapshot of the hub.
    pub async fn stats(&self) -> Result<HubStats, HuddleError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(HubCommand::Stats { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| HuddleError::HubUnavailable)
    }

    /// Tells the hub to close every connection and stop.
    pub async fn shutdown(&self) -> Result<(), HuddleError> {
        self.send(HubCommand::Shutdown).await
    }

    async fn send(&self, cmd: HubCommand) -> Result<(), HuddleError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| HuddleError::HubUnavailable)
    }
}

/// Starts a hub task and returns a handle to it.
pub(crate) fn spawn(liveness: LivenessConfig) -> (HubHandle, JoinHandle<()>) {
    let (sender, receiver) = mpsc::channel(COMMAND_BUFFER);
    let actor = HubActor {
        hub: Hub::new(liveness),
        receiver,
    };
    let task = tokio::spawn(actor.run());
    (HubHandle { sender }, task)
}

/// The task side: a [`Hub`] plus its command receiver.
struct HubActor {
    hub: Hub,
    receiver: mpsc::Receiver<HubCommand>,
}

impl HubActor {
    async fn run(mut self) {
        tracing::info!(
            probe_interval = ?self.hub.monitor.probe_interval(),
            "hub started"
        );

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(HubCommand::Connect { conn_id, handle }) => {
                        self.hub.on_connect(conn_id, handle);
                    }
                    Some(HubCommand::Frame { conn_id, data }) => {
                        self.hub.on_frame(conn_id, &data);
                    }
                    Some(HubCommand::Disconnect { conn_id }) => {
                        self.hub.on_disconnect(conn_id, DisconnectReason::Closed);
                    }
                    Some(HubCommand::Stats { reply }) => {
                        let _ = reply.send(self.hub.stats());
                    }
                    Some(HubCommand::Shutdown) | None => break,
                },
                info = self.hub.monitor.wait_for_probe() => {
                    tracing::trace!(
                        round = info.round,
                        late_by = ?info.late_by,
                        skipped = info.rounds_skipped,
                        "probe round due"
                    );
                    self.hub.on_probe();
                }
            }
        }

        let closed = self.hub.shutdown();
        let stats = self.hub.monitor.stats();
        tracing::info!(
            closed,
            rounds = stats.rounds,
            probes_sent = stats.probes_sent,
            evictions = stats.evictions,
            "hub stopped"
        );
    }
}

/// All chat state, mutated only from the hub task.
pub(crate) struct Hub {
    pub(crate) registry: ConnectionRegistry,
    pub(crate) directory: PresenceDirectory,
    pub(crate) monitor: LivenessMonitor,
    pub(crate) codec: JsonCodec,
}

impl Hub {
    pub(crate) fn new(liveness: LivenessConfig) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            directory: PresenceDirectory::new(),
            monitor: LivenessMonitor::new(liveness),
            codec: JsonCodec,
        }
    }

    pub(crate) fn on_connect(
        &mut self,
        conn_id: ConnectionId,
        handle: ConnectionHandle,
    ) {
        if self.registry.register(conn_id, handle) {
            self.monitor.track(conn_id);
            tracing::debug!(%conn_id, "connection joined hub");
        }
    }

    /// Cleanup shared by every way a connection can end. Idempotent: a
    /// second call finds nothing to release and broadcasts nothing.
    pub(crate) fn on_disconnect(
        &mut self,
        conn_id: ConnectionId,
        reason: DisconnectReason,
    ) {
        let was_registered = self.registry.unregister(conn_id);
        self.monitor.untrack(conn_id);

        if let Some(name) = self.directory.release(conn_id) {
            tracing::info!(%conn_id, name = %name, %reason, "user left chat");
            self.broadcast(ChatEvent::now(ServerEvent::UserLeaveChat { name }));
        } else if was_registered {
            tracing::debug!(%conn_id, %reason, "connection left hub");
        }
    }

    /// Runs one liveness round: terminate whoever missed the last probe,
    /// ping everyone else.
    pub(crate) fn on_probe(&mut self) {
        let sweep = self.monitor.sweep();

        for conn_id in sweep.evicted {
            tracing::warn!(%conn_id, "liveness probe unanswered, terminating");
            self.registry.close(conn_id, CloseReason::Unresponsive);
            self.on_disconnect(conn_id, DisconnectReason::LivenessTimeout);
        }

        if sweep.probed.is_empty() {
            return;
        }
        let Some(ping) = self.encode(&ChatEvent::from(ServerEvent::Ping)) else {
            return;
        };
        for conn_id in sweep.probed {
            self.deliver(conn_id, Arc::clone(&ping));
        }
    }

    pub(crate) fn stats(&self) -> HubStats {
        HubStats {
            connections: self.registry.len(),
            users: self.directory.profiles().cloned().collect(),
        }
    }

    /// Closes every connection. Returns how many there were.
    pub(crate) fn shutdown(&mut self) -> usize {
        self.registry.close_all(CloseReason::Normal)
    }

    /// Queues `event` for every signed-in connection.
    pub(crate) fn broadcast(&self, event: ChatEvent) {
        let Some(frame) = self.encode(&event) else {
            return;
        };
        let directory = &self.directory;
        let delivered = self
            .registry
            .broadcast(&frame, |conn| directory.is_authenticated(conn));
        tracing::trace!(delivered, "broadcast queued");
    }

    /// Queues `event` for one connection.
    pub(crate) fn send_to(&self, conn_id: ConnectionId, event: ChatEvent) {
        if let Some(frame) = self.encode(&event) {
            self.deliver(conn_id, frame);
        }
    }

    fn deliver(&self, conn_id: ConnectionId, frame: Arc<str>) {
        if let Err(e) = self.registry.send_to(conn_id, frame) {
            tracing::debug!(%conn_id, error = %e, "dropping outbound frame");
        }
    }

    fn encode(&self, event: &ChatEvent) -> Option<Arc<str>> {
        match self.codec.encode(event) {
            Ok(text) => Some(Arc::from(text)),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode outbound event");
                None
            }
        }
    }
}
