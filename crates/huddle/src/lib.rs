//! # Huddle
//!
//! Realtime presence and chat broadcast over WebSockets.
//!
//! Clients connect, claim a unique display name with a color, and from
//! then on every chat message, arrival and departure is broadcast to
//! everyone signed in. A liveness probe evicts connections that stop
//! answering, and connections from origins outside the whitelist are
//! refused before they can do anything.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use huddle::prelude::*;
//!
//! # async fn start() -> Result<(), HuddleError> {
//! let config = Config::from_env()?;
//! let server = HuddleServerBuilder::from_config(&config).build().await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod hub;
mod router;
mod server;

pub use config::{Config, ConfigError, Environment, OriginWhitelist};
pub use error::{DisconnectReason, HuddleError};
pub use hub::{HubHandle, HubStats};
pub use server::{HuddleServer, HuddleServerBuilder};

/// Convenience re-exports for the common case.
pub mod prelude {
    pub use crate::{
        Config, HubHandle, HubStats, HuddleError, HuddleServer,
        HuddleServerBuilder, OriginWhitelist,
    };
    pub use huddle_liveness::LivenessConfig;
    pub use huddle_protocol::UserProfile;
}
