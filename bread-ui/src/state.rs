//! Shared application state for the demo server.

use std::sync::Arc;

use bread::site::Site;
use tokio::sync::RwLock;

use crate::render::Renderer;

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Breads are fixed at startup; only the store changes, on form posts.
    pub site: Arc<RwLock<Site>>,
    pub renderer: Arc<Renderer>,
}

impl AppState {
    pub fn new(site: Site, renderer: Renderer) -> Self {
        Self {
            site: Arc::new(RwLock::new(site)),
            renderer: Arc::new(renderer),
        }
    }
}
