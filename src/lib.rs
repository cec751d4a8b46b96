//! Folio Server Library
//!
//! Opens PDF documents as named sessions and renders full pages, tiles and
//! previews into RGBA buffers. Every session's native document is touched by
//! one worker at a time, in submission order; sessions render in parallel on
//! a shared bounded pool.
//!
//! # Modules
//!
//! - `document`: session registry, handles, geometry and error taxonomy
//! - `render`: dispatcher, worker pool and page transforms
//! - `engine`: rasterization engine traits (MuPDF, synthetic)
//! - `routes`: HTTP boundary

pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod render;
pub mod routes;
pub mod state;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use state::AppState;

/// Build the HTTP application around `state`
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_document_bytes = state.config().server.max_document_bytes;

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/health", get(routes::health::health_check))
        .nest("/api/v1/documents", routes::documents::router(max_document_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
