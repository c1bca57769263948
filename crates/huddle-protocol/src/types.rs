//! Wire types: what clients send and what the server sends back.
//!
//! Every frame is a JSON object of the form
//!
//! ```text
//! { "type": string, "data": object, "createdAt"?: ISO-8601 }
//! ```
//!
//! Inbound frames decode into [`ClientFrame`]; outbound frames are built
//! as a [`ServerEvent`] wrapped in a [`ChatEvent`] that carries the
//! optional server timestamp.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{Codec, ProtocolError};

// ---------------------------------------------------------------------------
// Shared payloads
// ---------------------------------------------------------------------------

/// A signed-in user as the rest of the chat sees them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Display name. Unique across the server while the user is online.
    pub name: String,
    /// Display color chosen at sign-in, e.g. `"#ff0000"`.
    pub color: String,
}

impl UserProfile {
    /// Builds a profile from a name and a color.
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
        }
    }
}

/// The `data` of an inbound `userEnterChat` frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignIn {
    /// The display name the client wants to claim.
    #[serde(rename = "userName")]
    pub user_name: String,
    /// The display color for that name.
    pub color: String,
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Loose first-pass shape of any inbound frame.
///
/// Decoding in two steps keeps the unknown-tag case explicit: a frame
/// with an unrecognised `type` still parses here and becomes
/// [`ClientFrame::Unknown`] instead of a decode error.
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// `userEnterChat`: claim a display name.
    UserEnterChat(SignIn),
    /// `message`: a chat message. The object is forwarded as-is apart
    /// from the fields the server stamps itself.
    Message(Map<String, Value>),
    /// `pong`: answer to a liveness probe.
    Pong,
    /// Any other `type` tag.
    Unknown(String),
}

impl ClientFrame {
    /// Decodes one raw frame with the given codec.
    ///
    /// # Errors
    /// - [`ProtocolError::Decode`] — not JSON, no `type`, or a
    ///   `userEnterChat` without `userName`/`color`.
    /// - [`ProtocolError::InvalidMessage`] — a `message` whose `data` is
    ///   not an object.
    pub fn decode(
        codec: &impl Codec,
        data: &[u8],
    ) -> Result<Self, ProtocolError> {
        let raw: RawFrame = codec.decode(data)?;
        match raw.kind.as_str() {
            "userEnterChat" => serde_json::from_value(raw.data)
                .map(ClientFrame::UserEnterChat)
                .map_err(ProtocolError::Decode),
            "message" => match raw.data {
                Value::Object(map) => Ok(ClientFrame::Message(map)),
                other => Err(ProtocolError::InvalidMessage(format!(
                    "message data must be an object, got {other}"
                ))),
            },
            "pong" => Ok(ClientFrame::Pong),
            _ => Ok(ClientFrame::Unknown(raw.kind)),
        }
    }

    /// The wire tag this frame arrived with.
    pub fn kind(&self) -> &str {
        match self {
            ClientFrame::UserEnterChat(_) => "userEnterChat",
            ClientFrame::Message(_) => "message",
            ClientFrame::Pong => "pong",
            ClientFrame::Unknown(tag) => tag,
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Machine-readable kind of an `error` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// A `userEnterChat` claim was refused.
    SignInFailed,
}

/// The `data` of an outbound `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorData {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    /// Human-readable explanation shown to the user.
    pub message: String,
}

impl ErrorData {
    /// The refusal sent when someone else already holds `name`.
    pub fn name_taken(name: &str) -> Self {
        Self {
            kind: ErrorKind::SignInFailed,
            message: format!("Username {name} is taken."),
        }
    }
}

/// Everything the server can send, tagged the way clients expect:
/// `{ "type": "<camelCase variant>", "data": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Broadcast: somebody signed in.
    UserEnterChat(UserProfile),
    /// Private: the roster as it was just before the recipient signed in.
    InitialSlateOfOtherUsers(Vec<UserProfile>),
    /// Private: a request was refused.
    Error(ErrorData),
    /// Broadcast: a chat message with server-trusted `user` and `color`.
    Message(Map<String, Value>),
    /// Broadcast: somebody left or was evicted.
    UserLeaveChat { name: String },
    /// Private: liveness probe, answered with `pong`.
    Ping,
}

/// An outbound envelope: a [`ServerEvent`] plus the optional
/// server-side creation time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatEvent {
    #[serde(flatten)]
    pub event: ServerEvent,
    #[serde(
        rename = "createdAt",
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_timestamp"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

impl ChatEvent {
    /// Wraps an event stamped with the given creation time.
    pub fn at(event: ServerEvent, created_at: DateTime<Utc>) -> Self {
        Self {
            event,
            created_at: Some(created_at),
        }
    }

    /// Wraps an event stamped with the current time.
    pub fn now(event: ServerEvent) -> Self {
        Self::at(event, Utc::now())
    }
}

/// Unstamped envelope (private replies and probes).
impl From<ServerEvent> for ChatEvent {
    fn from(event: ServerEvent) -> Self {
        Self {
            event,
            created_at: None,
        }
    }
}

/// Millisecond precision with a `Z` suffix, the format browsers produce
/// for `Date#toJSON`.
fn serialize_timestamp<S: Serializer>(
    ts: &Option<DateTime<Utc>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match ts {
        Some(ts) => serializer
            .serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
        None => serializer.serialize_none(),
    }
}
