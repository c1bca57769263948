//! `HuddleServer` builder and accept loop.
//!
//! This is the entry point for running a Huddle chat server. It ties
//! together all the layers: transport → handler → hub.

use std::future::Future;
use std::sync::Arc;

use huddle_liveness::LivenessConfig;
use huddle_transport::{Transport, WebSocketTransport};
use tokio::task::JoinHandle;

use crate::config::{Config, OriginWhitelist};
use crate::handler::handle_connection;
use crate::hub::{self, HubHandle};
use crate::HuddleError;

/// Builder for configuring and starting a Huddle server.
///
/// # Example
///
/// ```rust,no_run
/// use huddle::prelude::*;
///
/// # async fn start() -> Result<(), HuddleError> {
/// let server = HuddleServer::builder()
///     .bind("0.0.0.0:8080")
///     .origin_whitelist(OriginWhitelist::new(["https://chat.example.com"]))
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HuddleServerBuilder {
    bind_addr: String,
    origins: OriginWhitelist,
    liveness: LivenessConfig,
}

impl HuddleServerBuilder {
    /// Creates a new builder with development defaults.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            origins: OriginWhitelist::development(),
            liveness: LivenessConfig::default(),
        }
    }

    /// Takes every setting from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Self {
        Self {
            bind_addr: config.bind_addr(),
            origins: config.origin_whitelist.clone(),
            liveness: config.liveness.clone(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets which `Origin` headers may connect.
    pub fn origin_whitelist(mut self, origins: OriginWhitelist) -> Self {
        self.origins = origins;
        self
    }

    /// Sets the liveness probe configuration.
    pub fn liveness(mut self, liveness: LivenessConfig) -> Self {
        self.liveness = liveness;
        self
    }

    /// Binds the listener and starts the hub.
    pub async fn build(self) -> Result<HuddleServer, HuddleError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let (hub, hub_task) = hub::spawn(self.liveness);

        Ok(HuddleServer {
            transport,
            hub,
            hub_task,
            origins: Arc::new(self.origins),
        })
    }
}

impl Default for HuddleServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Huddle server.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start
/// accepting connections.
pub struct HuddleServer {
    transport: WebSocketTransport,
    hub: HubHandle,
    hub_task: JoinHandle<()>,
    origins: Arc<OriginWhitelist>,
}

impl HuddleServer {
    /// Creates a new builder.
    pub fn builder() -> HuddleServerBuilder {
        HuddleServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// A handle to the hub, e.g. for [`HubHandle::stats`].
    pub fn hub(&self) -> HubHandle {
        self.hub.clone()
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), HuddleError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` resolves, then closes every
    /// connection and stops the hub.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), HuddleError> {
        tracing::info!(
            addr = ?self.transport.local_addr().ok(),
            origins = ?self.origins.origins(),
            "Huddle server running"
        );
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(handshake) => {
                        // The upgrade runs in the spawned task so a peer
                        // that never sends one can't stall the loop.
                        let hub = self.hub.clone();
                        let origins = Arc::clone(&self.origins);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(handshake, hub, origins).await {
                                tracing::debug!(
                                    error = %e,
                                    "connection ended with error"
                                );
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        tracing::info!("Huddle server shutting down");
        // An already-stopped hub is fine; there is nothing left to close.
        let _ = self.hub.shutdown().await;
        if let Err(e) = self.hub_task.await {
            tracing::error!(error = %e, "hub task failed");
        }
        Ok(())
    }
}
