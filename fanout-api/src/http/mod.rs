//! HTTP surface: client page, signaling upgrade, health and stats

mod error;
pub mod health;
pub mod index;
pub mod websocket;

pub use error::{AppError, AppResult};
pub use index::{ClientConfig, IndexPage};

use axum::{routing::get, Router};
use fanout_core::Config;
use fanout_sfu::{RtcEngine, SfuManager};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state for every handler
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SfuManager>,
    pub engine: Arc<RtcEngine>,
    pub index_page: Arc<IndexPage>,
    /// Overrides the signaling URL derived from the Host header
    pub public_ws_url: Option<String>,
    /// STUN/TURN URLs handed to the browser client
    pub ice_servers: Vec<String>,
    pub max_message_size: usize,
}

impl AppState {
    pub fn new(
        manager: Arc<SfuManager>,
        engine: Arc<RtcEngine>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            manager,
            engine,
            index_page: Arc::new(IndexPage::new()?),
            public_ws_url: config.server.public_ws_url.clone(),
            ice_servers: config.sfu.ice_servers.clone(),
            max_message_size: config.signaling.max_message_size,
        })
    }
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health and stats
        .merge(health::create_health_router())
        // Browser client
        .merge(index::create_index_router())
        // Signaling
        .route("/websocket", get(websocket::websocket_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
