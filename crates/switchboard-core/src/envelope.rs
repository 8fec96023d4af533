//! Signaling envelope: the JSON message format exchanged with peers.
//!
//! The relay only ever builds three notice kinds itself (`CURRENT_PEERS`,
//! `PEER_JOIN`, `PEER_LEAVE`). `PROXY` envelopes are produced by peers and
//! forwarded verbatim, so they have no typed representation here beyond the
//! routing fields in [`RoutingHeader`].

use serde::{Deserialize, Serialize};

/// Enumerated `messageId` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageId {
    CurrentPeers,
    PeerJoin,
    PeerLeave,
    Proxy,
}

impl MessageId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CurrentPeers => "CURRENT_PEERS",
            Self::PeerJoin => "PEER_JOIN",
            Self::PeerLeave => "PEER_LEAVE",
            Self::Proxy => "PROXY",
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "CURRENT_PEERS" => Some(Self::CurrentPeers),
            "PEER_JOIN" => Some(Self::PeerJoin),
            "PEER_LEAVE" => Some(Self::PeerLeave),
            "PROXY" => Some(Self::Proxy),
            _ => None,
        }
    }
}

/// Notices sent by the relay.
///
/// Serializes as `{"messageId": "...", "messageData": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "messageId", content = "messageData")]
pub enum Envelope {
    #[serde(rename = "CURRENT_PEERS")]
    CurrentPeers {
        #[serde(rename = "peerList")]
        peer_list: Vec<String>,
    },

    #[serde(rename = "PEER_JOIN")]
    PeerJoin {
        #[serde(rename = "peerId")]
        peer_id: String,
    },

    #[serde(rename = "PEER_LEAVE")]
    PeerLeave {
        #[serde(rename = "peerId")]
        peer_id: String,
    },
}

impl Envelope {
    pub fn current_peers(peer_list: Vec<String>) -> Self {
        Self::CurrentPeers { peer_list }
    }

    pub fn peer_join(peer_id: impl Into<String>) -> Self {
        Self::PeerJoin {
            peer_id: peer_id.into(),
        }
    }

    pub fn peer_leave(peer_id: impl Into<String>) -> Self {
        Self::PeerLeave {
            peer_id: peer_id.into(),
        }
    }

    pub fn message_id(&self) -> MessageId {
        match self {
            Self::CurrentPeers { .. } => MessageId::CurrentPeers,
            Self::PeerJoin { .. } => MessageId::PeerJoin,
            Self::PeerLeave { .. } => MessageId::PeerLeave,
        }
    }

    /// Serialize to the text frame sent on the wire.
    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(EnvelopeError::Serialize)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(data).map_err(EnvelopeError::Malformed)
    }
}

/// The only fields the router reads from an inbound envelope.
/// Everything else in the object is opaque and ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingHeader {
    #[serde(rename = "messageId")]
    pub message_id: String,

    /// Destination peer, present on `PROXY` envelopes.
    #[serde(rename = "toPeerId", default)]
    pub to_peer_id: Option<String>,
}

impl RoutingHeader {
    /// Parse the routing fields out of a raw inbound frame.
    ///
    /// The frame must be a JSON object. Going through a map first keeps
    /// serde from accepting an array as a positional field list.
    pub fn parse(raw: &[u8]) -> Result<Self, EnvelopeError> {
        let object: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(raw).map_err(EnvelopeError::Malformed)?;
        serde_json::from_value(serde_json::Value::Object(object)).map_err(EnvelopeError::Malformed)
    }

    /// Known tag, or `None` for tags this relay has never heard of.
    pub fn kind(&self) -> Option<MessageId> {
        MessageId::from_wire(&self.message_id)
    }
}

/// Check a peer identifier supplied at connect time.
pub fn validate_peer_id(peer_id: &str) -> Result<&str, EnvelopeError> {
    if peer_id.is_empty() {
        return Err(EnvelopeError::EmptyPeerId);
    }
    Ok(peer_id)
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Malformed(serde_json::Error),
    #[error("failed to serialize envelope: {0}")]
    Serialize(serde_json::Error),
    #[error("peer id must not be empty")]
    EmptyPeerId,
}
