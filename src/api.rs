//! HTTP API for the fitness assistant
//!
//! Each request is one conversation turn: the handler delivers the event to
//! the user's runtime and answers with the replies and resulting state.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::db::Database;
use crate::runtime::{DatabaseStorage, RuntimeManager};
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<RuntimeManager>,
}

impl AppState {
    pub fn new(db: Database, mailbox_capacity: usize) -> Self {
        Self {
            runtime: Arc::new(RuntimeManager::new(
                DatabaseStorage::new(db),
                mailbox_capacity,
            )),
        }
    }
}
