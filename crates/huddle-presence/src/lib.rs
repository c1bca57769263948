//! Presence tracking for Huddle.
//!
//! Two pieces of bookkeeping, both plain single-owner data structures:
//!
//! 1. **Connection registry** ([`ConnectionRegistry`]) — every live
//!    connection, the outbox its writer task drains and the signal that
//!    tears it down, signed in or not.
//! 2. **Presence directory** ([`PresenceDirectory`]) — which display
//!    name belongs to which connection, and that user's profile.
//!
//! # How it fits in the stack
//!
//! ```text
//! Hub (above)  ← owns one registry and one directory, mutates them in order
//!     ↕
//! Presence (this crate)
//!     ↕
//! Protocol / Transport (below)  ← UserProfile, ConnectionId
//! ```
//!
//! Neither type locks. They are meant to be owned by a single task (the
//! hub actor), which is what makes `claim` and `release` atomic.

mod directory;
mod error;
mod registry;

pub use directory::{Claim, PresenceDirectory};
pub use error::{PresenceError, RegistryError};
pub use registry::{ConnectionHandle, ConnectionRegistry, Mailbox, Outbox, mailbox};
