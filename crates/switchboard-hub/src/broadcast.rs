//! Event broadcaster for membership notices.

use switchboard_core::Envelope;

use crate::connection::Disconnect;
use crate::registry::{PeerHandle, PeerRegistry, SendError};

/// Builds notice envelopes and fans them out through the registry.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: PeerRegistry,
}

impl Broadcaster {
    pub fn new(registry: PeerRegistry) -> Self {
        Self { registry }
    }

    /// Send `CURRENT_PEERS` (everyone but `excluding`) to one sink only.
    pub fn announce_current_peers(&self, to: &PeerHandle, excluding: &str) -> bool {
        let envelope = Envelope::current_peers(self.registry.snapshot_ids(excluding));
        match envelope.to_json() {
            Ok(frame) => deliver(excluding, to, frame),
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode current peers");
                false
            }
        }
    }

    /// Send `PEER_JOIN` to every registered sink, the joining peer included.
    /// Returns the number of sinks that accepted the frame.
    pub fn broadcast_join(&self, peer_id: &str) -> usize {
        self.fan_out(&Envelope::peer_join(peer_id))
    }

    /// Send `PEER_LEAVE` to every registered sink. The leaving peer has
    /// already been unregistered and does not get it.
    pub fn broadcast_leave(&self, peer_id: &str) -> usize {
        self.fan_out(&Envelope::peer_leave(peer_id))
    }

    fn fan_out(&self, envelope: &Envelope) -> usize {
        let frame = match envelope.to_json() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, message_id = envelope.message_id().as_str(), "failed to encode notice");
                return 0;
            }
        };

        let mut delivered = 0;
        self.registry.for_each(|peer_id, handle| {
            if deliver(peer_id, handle, frame.clone()) {
                delivered += 1;
            }
        });
        tracing::debug!(
            message_id = envelope.message_id().as_str(),
            delivered,
            "notice broadcast"
        );
        delivered
    }
}

/// Offer a frame to one peer. Failures stay with that peer: a closed queue
/// is skipped, a full queue gets its connection evicted.
pub(crate) fn deliver(peer_id: &str, handle: &PeerHandle, frame: String) -> bool {
    match handle.send(frame) {
        Ok(()) => true,
        Err(SendError::Closed) => {
            tracing::debug!(peer = peer_id, conn = %handle.connection(), "peer queue closed, frame dropped");
            false
        }
        Err(SendError::Full) => {
            if handle.close(Disconnect::Evicted) {
                tracing::warn!(peer = peer_id, conn = %handle.connection(), "outbound queue full, evicting slow peer");
            }
            false
        }
    }
}
