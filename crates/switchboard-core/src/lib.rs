//! switchboard-core: wire envelope and configuration.
//! All other Switchboard crates depend on this one.

pub mod config;
pub mod envelope;

pub use config::{ConfigError, DuplicatePeerPolicy, SwitchboardConfig};
pub use envelope::{validate_peer_id, Envelope, EnvelopeError, MessageId, RoutingHeader};
