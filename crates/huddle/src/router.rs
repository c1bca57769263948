//! Routing of inbound frames.
//!
//! A connection is unauthenticated until it claims a name and
//! authenticated from then until it closes. The directory is the only
//! record of which state it is in.
//!
//! | State | Frame | Effect |
//! |---|---|---|
//! | unauthenticated | `userEnterChat` | claim; broadcast + roster, or `signInFailed` |
//! | unauthenticated | anything else | dropped |
//! | authenticated | `message` | re-stamped and broadcast |
//! | authenticated | `pong` | liveness acknowledged |
//! | authenticated | `userEnterChat` | dropped |
//!
//! Frames that don't decode are dropped; the connection stays open.

use huddle_presence::{Claim, PresenceError};
use huddle_protocol::{ChatEvent, ClientFrame, ErrorData, ServerEvent, SignIn};
use huddle_transport::ConnectionId;
use serde_json::{Map, Value};

use crate::hub::Hub;

impl Hub {
    /// Decodes and routes one inbound frame.
    pub(crate) fn on_frame(&mut self, conn_id: ConnectionId, data: &[u8]) {
        if !self.registry.contains(conn_id) {
            // Raced with an eviction; the reader hasn't noticed yet.
            tracing::trace!(%conn_id, "frame from unregistered connection");
            return;
        }

        let frame = match ClientFrame::decode(&self.codec, data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "dropping malformed frame");
                return;
            }
        };

        if !self.directory.is_authenticated(conn_id) {
            match frame {
                ClientFrame::UserEnterChat(sign_in) => self.sign_in(conn_id, sign_in),
                other => tracing::debug!(
                    %conn_id,
                    kind = other.kind(),
                    "dropping frame from unauthenticated connection"
                ),
            }
            return;
        }

        match frame {
            ClientFrame::Message(data) => self.chat_message(conn_id, data),
            ClientFrame::Pong => {
                self.monitor.acknowledge(conn_id);
            }
            ClientFrame::UserEnterChat(sign_in) => tracing::debug!(
                %conn_id,
                requested = %sign_in.user_name,
                "ignoring sign-in from signed-in connection"
            ),
            ClientFrame::Unknown(kind) => {
                tracing::debug!(%conn_id, %kind, "ignoring unknown frame type");
            }
        }
    }

    fn sign_in(&mut self, conn_id: ConnectionId, sign_in: SignIn) {
        match self.directory.claim(&sign_in.user_name, &sign_in.color, conn_id) {
            Ok(Claim { profile, others }) => {
                self.broadcast(ChatEvent::now(ServerEvent::UserEnterChat(profile)));
                self.send_to(
                    conn_id,
                    ServerEvent::InitialSlateOfOtherUsers(others).into(),
                );
            }
            Err(PresenceError::NameTaken(name)) => {
                tracing::info!(
                    %conn_id,
                    name = %name,
                    holder = ?self.directory.owner_of(&name),
                    "sign-in refused, name taken"
                );
                self.send_to(
                    conn_id,
                    ServerEvent::Error(ErrorData::name_taken(&name)).into(),
                );
            }
            Err(e @ PresenceError::AlreadySignedIn { .. }) => {
                tracing::debug!(%conn_id, error = %e, "ignoring repeated sign-in");
            }
        }
    }

    /// Rebroadcasts a chat message under the sender's signed-in identity.
    fn chat_message(&mut self, conn_id: ConnectionId, mut data: Map<String, Value>) {
        let Some(name) = self.directory.name_of(conn_id) else {
            return;
        };
        let color = self.directory.color_of(name).unwrap_or_default();

        data.insert("user".into(), Value::String(name.to_owned()));
        data.insert("color".into(), Value::String(color.to_owned()));

        self.broadcast(ChatEvent::now(ServerEvent::Message(data)));
    }
}
