//! Peer registry: which peer ids are connected and how to reach them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};

use crate::connection::Disconnect;

/// Process-unique tag for one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One-shot request for a connection to leave its receive loop.
///
/// The first recorded reason wins; later triggers are ignored.
#[derive(Debug, Default)]
pub struct CloseSignal {
    notify: Notify,
    reason: OnceLock<Disconnect>,
}

impl CloseSignal {
    /// Returns false if a reason was already recorded.
    pub fn trigger(&self, reason: Disconnect) -> bool {
        if self.reason.set(reason).is_ok() {
            self.notify.notify_one();
            true
        } else {
            false
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.reason.get().is_some()
    }

    /// Resolves once `trigger` has been called.
    pub async fn triggered(&self) -> Disconnect {
        loop {
            if let Some(reason) = self.reason.get() {
                return reason.clone();
            }
            self.notify.notified().await;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("peer queue is closed")]
    Closed,
    #[error("peer queue is full")]
    Full,
}

/// Outbound sink for one peer: a bounded frame queue drained by the
/// connection's writer task.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    conn: ConnectionId,
    tx: mpsc::Sender<String>,
    close: Arc<CloseSignal>,
    connected_at: Instant,
}

impl PeerHandle {
    /// Create a handle and the queue receiver its writer drains.
    pub fn new(conn: ConnectionId, capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            conn,
            tx,
            close: Arc::new(CloseSignal::default()),
            connected_at: Instant::now(),
        };
        (handle, rx)
    }

    pub fn connection(&self) -> ConnectionId {
        self.conn
    }

    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Queue a frame without waiting.
    pub fn send(&self, frame: String) -> Result<(), SendError> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => SendError::Full,
            TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Ask the owning connection to terminate.
    pub fn close(&self, reason: Disconnect) -> bool {
        self.close.trigger(reason)
    }

    pub fn close_signal(&self) -> Arc<CloseSignal> {
        self.close.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("peer id {0:?} is already registered")]
    Taken(String),
}

/// Peer id → outbound sink. Shared by every connection task.
///
/// Backed by a sharded lock map, so register/unregister/iterate never race.
/// Callbacks passed to [`PeerRegistry::for_each`] run under a shard read
/// lock and must not touch the registry themselves.
#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    peers: Arc<DashMap<String, PeerHandle>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. The replaced handle is returned, not closed.
    pub fn register(&self, peer_id: &str, handle: PeerHandle) -> Option<PeerHandle> {
        self.peers.insert(peer_id.to_string(), handle)
    }

    /// Insert only if the id is free.
    pub fn try_register(&self, peer_id: &str, handle: PeerHandle) -> Result<(), RegistryError> {
        match self.peers.entry(peer_id.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::Taken(peer_id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(handle);
                Ok(())
            }
        }
    }

    /// Remove whatever is registered under `peer_id`.
    pub fn unregister(&self, peer_id: &str) -> Option<PeerHandle> {
        self.peers.remove(peer_id).map(|(_, handle)| handle)
    }

    /// Remove the entry only if it still belongs to `conn`.
    pub fn unregister_connection(&self, peer_id: &str, conn: ConnectionId) -> bool {
        self.peers
            .remove_if(peer_id, |_, handle| handle.conn == conn)
            .is_some()
    }

    pub fn lookup(&self, peer_id: &str) -> Option<PeerHandle> {
        self.peers.get(peer_id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.peers.contains_key(peer_id)
    }

    /// Registered ids other than `excluding`, sorted.
    pub fn snapshot_ids(&self, excluding: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .peers
            .iter()
            .filter(|entry| entry.key() != excluding)
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn for_each(&self, mut f: impl FnMut(&str, &PeerHandle)) {
        for entry in self.peers.iter() {
            f(entry.key(), entry.value());
        }
    }

    /// (peer id, time connected) for every registered peer, sorted by id.
    pub fn peers(&self) -> Vec<(String, Duration)> {
        let mut peers: Vec<(String, Duration)> = self
            .peers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().connected_for()))
            .collect();
        peers.sort_by(|a, b| a.0.cmp(&b.0));
        peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
