pub mod api;
pub mod cache;
pub mod chat;
pub mod completion;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod search;
pub mod state;
pub mod types;
pub mod worker;

use std::sync::Arc;

/// Shared by every request handler.
pub struct AppState {
    pub chat: chat::ChatSession,
    // Also read directly by the operator endpoints
    pub shared: Arc<state::SharedState>,
}

// Re-export types for easy access
pub use types::*;
