//! The presence directory: who is signed in, under which name, on which
//! connection.
//!
//! # Invariant
//!
//! `profiles`, `owners` and `names` always describe the same set of
//! users. A name is in `profiles` iff it is in `owners`, and iff some
//! connection maps to it in `names`. Every mutation touches all three.

use std::collections::HashMap;

use huddle_protocol::UserProfile;
use huddle_transport::ConnectionId;
use indexmap::IndexMap;

use crate::PresenceError;

/// Result of a successful [`PresenceDirectory::claim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    /// The profile that was just created.
    pub profile: UserProfile,
    /// Everyone who was already signed in, in sign-in order. Never
    /// includes `profile`.
    pub others: Vec<UserProfile>,
}

/// Maps claimed display names to profiles and owning connections.
#[derive(Debug, Default)]
pub struct PresenceDirectory {
    /// Profiles in sign-in order. The roster sent to new users is read
    /// from here, so the order is part of the protocol.
    profiles: IndexMap<String, UserProfile>,

    /// Which connection owns each name.
    owners: HashMap<String, ConnectionId>,

    /// Reverse index so a closing connection can find its name without
    /// scanning.
    names: HashMap<ConnectionId, String>,
}

impl PresenceDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `name` for `conn`.
    ///
    /// Names are compared byte-for-byte: `"Alice"` and `"alice"` are
    /// different users, and `" alice"` is a third.
    ///
    /// # Errors
    /// - [`PresenceError::AlreadySignedIn`] — `conn` already holds a name
    /// - [`PresenceError::NameTaken`] — someone else holds `name`
    ///
    /// On error the directory is unchanged.
    pub fn claim(
        &mut self,
        name: &str,
        color: &str,
        conn: ConnectionId,
    ) -> Result<Claim, PresenceError> {
        if let Some(existing) = self.names.get(&conn) {
            return Err(PresenceError::AlreadySignedIn {
                conn,
                name: existing.clone(),
            });
        }
        if self.profiles.contains_key(name) {
            return Err(PresenceError::NameTaken(name.to_owned()));
        }

        let others: Vec<UserProfile> =
            self.profiles.values().cloned().collect();
        let profile = UserProfile::new(name, color);

        self.profiles.insert(name.to_owned(), profile.clone());
        self.owners.insert(name.to_owned(), conn);
        self.names.insert(conn, name.to_owned());

        tracing::info!(%conn, name, users = self.profiles.len(), "name claimed");
        Ok(Claim { profile, others })
    }

    /// Releases whatever name `conn` holds and returns it.
    ///
    /// Returns `None` when `conn` never signed in or was already
    /// released, so calling this twice is harmless.
    pub fn release(&mut self, conn: ConnectionId) -> Option<String> {
        let name = self.names.remove(&conn)?;
        // shift_remove keeps the remaining roster in sign-in order.
        self.profiles.shift_remove(&name);
        self.owners.remove(&name);
        tracing::info!(%conn, name = %name, users = self.profiles.len(), "name released");
        Some(name)
    }

    /// Whether `conn` has claimed a name.
    pub fn is_authenticated(&self, conn: ConnectionId) -> bool {
        self.names.contains_key(&conn)
    }

    /// The name `conn` signed in with.
    pub fn name_of(&self, conn: ConnectionId) -> Option<&str> {
        self.names.get(&conn).map(String::as_str)
    }

    /// The color recorded when `name` was claimed.
    pub fn color_of(&self, name: &str) -> Option<&str> {
        self.profiles.get(name).map(|p| p.color.as_str())
    }

    /// The connection that owns `name`.
    pub fn owner_of(&self, name: &str) -> Option<ConnectionId> {
        self.owners.get(name).copied()
    }

    /// All signed-in users, in sign-in order.
    pub fn profiles(&self) -> impl Iterator<Item = &UserProfile> {
        self.profiles.values()
    }

    /// Number of signed-in users.
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Returns `true` if nobody is signed in.
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
