use std::sync::Arc;

use crate::fanout::Hub;

/// Shared state handed to every HTTP handler.
pub struct AppState {
    pub hub: Arc<Hub>,
}

impl AppState {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }
}
