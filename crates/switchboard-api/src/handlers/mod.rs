//! HTTP handlers for both endpoints.

pub mod page;
pub mod signal;
pub mod status;

use std::path::PathBuf;

use switchboard_hub::Hub;

#[derive(Clone, Debug)]
pub struct ApiState {
    pub hub: Hub,
    /// HTML file served at `/` on the page endpoint.
    pub index_path: PathBuf,
}

impl ApiState {
    pub fn new(hub: Hub, index_path: impl Into<PathBuf>) -> Self {
        Self {
            hub,
            index_path: index_path.into(),
        }
    }
}

// Re-export handler functions for use in router setup.
pub use page::{handle_home, handle_not_found};
pub use signal::handle_signal;
pub use status::handle_peers;
