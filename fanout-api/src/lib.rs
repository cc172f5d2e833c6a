//! Fanout API layer
//!
//! axum router exposing the browser client, the WebSocket signaling
//! endpoint and health/stats endpoints on top of `fanout-sfu`.

pub mod http;

pub use http::{create_router, AppError, AppResult, AppState};
