//! Wire protocol for Huddle.
//!
//! This crate defines the "language" chat clients and the server speak:
//!
//! - **Types** ([`ClientFrame`], [`ServerEvent`], [`ChatEvent`],
//!   [`UserProfile`]) — the frames that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those frames are
//!   converted to and from text.
//! - **Errors** ([`ProtocolError`]) — what can go wrong on the way.
//!
//! The protocol layer knows nothing about connections or who is signed
//! in; it only shapes and parses frames.
//!
//! ```text
//! Transport (text frames) → Protocol (ClientFrame / ChatEvent) → Hub
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    ChatEvent, ClientFrame, ErrorData, ErrorKind, ServerEvent, SignIn,
    UserProfile,
};
