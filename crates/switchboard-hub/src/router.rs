//! Message router: forwards `PROXY` envelopes to their destination peer.
//!
//! Only the routing fields are parsed. The frame delivered to the
//! destination is the sender's frame, byte for byte.

use switchboard_core::{MessageId, RoutingHeader};

use crate::broadcast::deliver;
use crate::registry::PeerRegistry;

/// What happened to one inbound frame. Never reported back to the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Queued on the destination's sink.
    Delivered,
    /// Destination is registered but its sink refused the frame.
    RecipientUnavailable,
    /// No peer registered under `toPeerId`.
    NoRecipient,
    /// `PROXY` without a `toPeerId`.
    MissingDestination,
    /// Valid envelope of a kind peers may not route; carries the tag.
    Ignored(String),
    /// Not a JSON object with a string `messageId`.
    Malformed,
}

#[derive(Debug, Clone)]
pub struct Router {
    registry: PeerRegistry,
}

impl Router {
    pub fn new(registry: PeerRegistry) -> Self {
        Self { registry }
    }

    pub fn route(&self, sender_id: &str, raw: &[u8]) -> RouteOutcome {
        let header = match RoutingHeader::parse(raw) {
            Ok(header) => header,
            Err(e) => {
                tracing::debug!(peer = sender_id, error = %e, "dropping malformed envelope");
                return RouteOutcome::Malformed;
            }
        };

        if header.kind() != Some(MessageId::Proxy) {
            tracing::debug!(peer = sender_id, message_id = %header.message_id, "ignoring non-proxy envelope");
            return RouteOutcome::Ignored(header.message_id);
        }

        let Some(to) = header.to_peer_id.as_deref() else {
            tracing::debug!(peer = sender_id, "proxy envelope without toPeerId");
            return RouteOutcome::MissingDestination;
        };

        let Some(handle) = self.registry.lookup(to) else {
            tracing::debug!(peer = sender_id, to, "no such peer, proxy dropped");
            return RouteOutcome::NoRecipient;
        };

        // The header parse has already validated the whole frame as UTF-8,
        // so this copy is byte-identical.
        let frame = String::from_utf8_lossy(raw).into_owned();
        if deliver(to, &handle, frame) {
            tracing::trace!(peer = sender_id, to, bytes = raw.len(), "proxy forwarded");
            RouteOutcome::Delivered
        } else {
            RouteOutcome::RecipientUnavailable
        }
    }
}
