//! Connection lifecycle: CONNECTING → REGISTERED → ACTIVE → CLOSED.
//!
//! Per connection:
//!   1. validate the peer id and register an outbound handle, unless the hub
//!      is already shutting down
//!   2. send CURRENT_PEERS to the new peer, then PEER_JOIN to everyone
//!   3. route inbound frames until the transport closes, fails, the peer is
//!      evicted, or the hub shuts down
//!   4. unregister, send PEER_LEAVE, release the transport
//!
//! Outbound frames are queued on the peer's handle and written by a
//! dedicated writer task, so a stalled socket never blocks the receive loop
//! or another peer's broadcast.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;

use switchboard_core::{validate_peer_id, DuplicatePeerPolicy};

use crate::registry::{CloseSignal, ConnectionId, PeerHandle};
use crate::Hub;

/// One inbound transport event, already stripped of framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// Data frame: a raw envelope.
    Frame(Bytes),
    /// Transport housekeeping (ping/pong); ignored.
    Control,
    /// Peer sent a close frame.
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Registered,
    Active,
    Closed,
}

/// Why a connection left the ACTIVE state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disconnect {
    /// Peer closed the channel or the stream ended.
    Closed,
    /// Reading from the transport failed.
    TransportError(String),
    /// Writing to the transport failed.
    WriteFailed(String),
    /// Outbound queue overflowed.
    Evicted,
    /// Hub is shutting down.
    Shutdown,
}

impl fmt::Display for Disconnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("closed"),
            Self::TransportError(e) => write!(f, "read error: {e}"),
            Self::WriteFailed(e) => write!(f, "write error: {e}"),
            Self::Evicted => f.write_str("evicted"),
            Self::Shutdown => f.write_str("shutdown"),
        }
    }
}

/// Connection refused before registration. The registry is untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("peer id must not be empty")]
    EmptyPeerId,
    #[error("peer id {0:?} is already connected")]
    DuplicatePeerId(String),
    #[error("relay is shutting down")]
    ShuttingDown,
}

impl Hub {
    /// Drive one peer connection to completion.
    ///
    /// Returns once the connection is CLOSED: its registry entry is gone
    /// (unless a newer connection took the id over), PEER_LEAVE has been
    /// broadcast, and `outbound` has been closed or dropped.
    pub async fn connect<S, T, E>(
        &self,
        peer_id: &str,
        inbound: S,
        outbound: T,
    ) -> Result<Disconnect, ConnectError>
    where
        S: Stream<Item = Result<Incoming, E>> + Send,
        E: fmt::Display,
        T: Sink<String> + Send + 'static,
        T::Error: fmt::Display + Send,
    {
        let conn = ConnectionId::next();
        let mut outbound = Box::pin(outbound);
        trace_state(peer_id, conn, ConnectionState::Connecting);

        if validate_peer_id(peer_id).is_err() {
            tracing::info!(conn = %conn, "rejecting connection without peer id");
            let _ = outbound.close().await;
            return Err(ConnectError::EmptyPeerId);
        }

        if self.is_shutting_down() {
            tracing::info!(peer = peer_id, conn = %conn, "rejecting connection during shutdown");
            let _ = outbound.close().await;
            return Err(ConnectError::ShuttingDown);
        }

        let (handle, queue) = PeerHandle::new(conn, self.inner.options.send_queue_capacity);
        if let Err(e) = self.register(peer_id, &handle) {
            let _ = outbound.close().await;
            return Err(e);
        }
        trace_state(peer_id, conn, ConnectionState::Registered);
        tracing::info!(peer = peer_id, conn = %conn, peers = self.inner.registry.len(), "peer connected");

        let mut writer = tokio::spawn(write_loop(
            peer_id.to_string(),
            queue,
            outbound,
            handle.close_signal(),
        ));

        self.inner.broadcaster.announce_current_peers(&handle, peer_id);
        self.inner.broadcaster.broadcast_join(peer_id);
        trace_state(peer_id, conn, ConnectionState::Active);

        let cause = self.receive_loop(peer_id, &handle, inbound).await;

        if self.inner.registry.unregister_connection(peer_id, conn) {
            self.inner.broadcaster.broadcast_leave(peer_id);
        } else {
            tracing::debug!(peer = peer_id, conn = %conn, "peer id owned by a newer connection, no leave notice");
        }
        drop(handle);

        match cause {
            Disconnect::Evicted | Disconnect::WriteFailed(_) => writer.abort(),
            _ => {
                if tokio::time::timeout(self.inner.options.flush_timeout, &mut writer)
                    .await
                    .is_err()
                {
                    tracing::debug!(peer = peer_id, conn = %conn, "flush timed out");
                    writer.abort();
                }
            }
        }

        trace_state(peer_id, conn, ConnectionState::Closed);
        tracing::info!(peer = peer_id, conn = %conn, reason = %cause, "peer disconnected");
        Ok(cause)
    }

    fn register(&self, peer_id: &str, handle: &PeerHandle) -> Result<(), ConnectError> {
        let registry = &self.inner.registry;
        match self.inner.options.duplicate_peer_policy {
            DuplicatePeerPolicy::Replace => {
                if let Some(previous) = registry.register(peer_id, handle.clone()) {
                    tracing::info!(
                        peer = peer_id,
                        conn = %handle.connection(),
                        replaced = %previous.connection(),
                        "peer id taken over by new connection"
                    );
                }
                Ok(())
            }
            DuplicatePeerPolicy::Reject => registry
                .try_register(peer_id, handle.clone())
                .map_err(|_| {
                    tracing::info!(peer = peer_id, conn = %handle.connection(), "rejecting duplicate peer id");
                    ConnectError::DuplicatePeerId(peer_id.to_string())
                }),
        }
    }

    async fn receive_loop<S, E>(&self, peer_id: &str, handle: &PeerHandle, inbound: S) -> Disconnect
    where
        S: Stream<Item = Result<Incoming, E>> + Send,
        E: fmt::Display,
    {
        let mut inbound = std::pin::pin!(inbound);
        let close = handle.close_signal();
        let mut shutdown = self.shutdown_receiver();
        if *shutdown.borrow() {
            return Disconnect::Shutdown;
        }

        loop {
            tokio::select! {
                frame = inbound.next() => match frame {
                    Some(Ok(Incoming::Frame(raw))) => {
                        let outcome = self.inner.router.route(peer_id, &raw);
                        tracing::trace!(peer = peer_id, ?outcome, "inbound frame");
                    }
                    Some(Ok(Incoming::Control)) => {}
                    Some(Ok(Incoming::Close)) | None => return Disconnect::Closed,
                    Some(Err(e)) => {
                        tracing::warn!(peer = peer_id, conn = %handle.connection(), error = %e, "read failed");
                        return Disconnect::TransportError(e.to_string());
                    }
                },
                reason = close.triggered() => return reason,
                changed = shutdown.changed() => {
                    let stop = changed.is_err() || *shutdown.borrow();
                    if stop {
                        return Disconnect::Shutdown;
                    }
                }
            }
        }
    }
}

/// Drain the peer's queue into the transport. Ends when every handle clone
/// is gone, then closes the transport.
async fn write_loop<T>(
    peer_id: String,
    mut queue: mpsc::Receiver<String>,
    mut sink: Pin<Box<T>>,
    close: Arc<CloseSignal>,
) where
    T: Sink<String>,
    T::Error: fmt::Display + Send,
{
    while let Some(frame) = queue.recv().await {
        if let Err(e) = sink.send(frame).await {
            tracing::warn!(peer = %peer_id, error = %e, "write failed");
            close.trigger(Disconnect::WriteFailed(e.to_string()));
            return;
        }
    }
    let _ = sink.close().await;
}

fn trace_state(peer_id: &str, conn: ConnectionId, state: ConnectionState) {
    tracing::debug!(peer = peer_id, conn = %conn, ?state, "connection state");
}
