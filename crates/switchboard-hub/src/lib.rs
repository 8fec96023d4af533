//! switchboard-hub: the peer registry and the per-connection lifecycle
//! built on top of it.
//!
//! The hub knows nothing about sockets. A connection is any stream of
//! [`Incoming`] frames paired with any `Sink<String>` for outbound frames.

pub mod broadcast;
pub mod connection;
pub mod registry;
pub mod router;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use switchboard_core::config::RelayConfig;
use switchboard_core::DuplicatePeerPolicy;

pub use broadcast::Broadcaster;
pub use connection::{ConnectError, ConnectionState, Disconnect, Incoming};
pub use registry::{ConnectionId, PeerHandle, PeerRegistry, RegistryError, SendError};
pub use router::{RouteOutcome, Router};

/// Tunables for connection handling.
#[derive(Debug, Clone)]
pub struct HubOptions {
    pub duplicate_peer_policy: DuplicatePeerPolicy,
    pub send_queue_capacity: usize,
    pub flush_timeout: Duration,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

impl From<&RelayConfig> for HubOptions {
    fn from(config: &RelayConfig) -> Self {
        Self {
            duplicate_peer_policy: config.duplicate_peer_policy,
            send_queue_capacity: config.send_queue_capacity.max(1),
            flush_timeout: Duration::from_millis(config.flush_timeout_ms),
        }
    }
}

/// One relay instance: a registry plus everything that reads and writes it.
///
/// Cheap to clone; clones share state. Created at startup, and
/// [`Hub::shutdown`] closes every connection it is serving.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    registry: PeerRegistry,
    broadcaster: Broadcaster,
    router: Router,
    options: HubOptions,
    shutdown: watch::Sender<bool>,
}

impl Hub {
    pub fn new(options: HubOptions) -> Self {
        let registry = PeerRegistry::new();
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(HubInner {
                broadcaster: Broadcaster::new(registry.clone()),
                router: Router::new(registry.clone()),
                registry,
                options,
                shutdown,
            }),
        }
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.inner.registry
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.inner.broadcaster
    }

    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    pub fn options(&self) -> &HubOptions {
        &self.inner.options
    }

    /// Terminate every active connection, now and in future.
    pub fn shutdown(&self) {
        if !self.inner.shutdown.send_replace(true) {
            tracing::info!(peers = self.inner.registry.len(), "hub shutting down");
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.subscribe()
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("peers", &self.inner.registry.len())
            .field("options", &self.inner.options)
            .finish()
    }
}
