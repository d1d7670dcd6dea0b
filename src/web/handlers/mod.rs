//! API handlers for the clip query API.

pub mod clips;

pub use clips::*;

use crate::db::ClipStore;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Read access to stored clips.
    pub store: ClipStore,
}

impl AppState {
    pub fn new(store: ClipStore) -> Self {
        Self { store }
    }
}
