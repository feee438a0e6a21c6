//! The HTTP transport shell: one sync endpoint plus a liveness probe.

mod handlers;

use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::engine::SyncServer;

#[derive(Clone)]
pub struct AppState {
    pub server: Arc<SyncServer>,
}

/// Build the router: CORS mirrors whatever `Origin` the request carries
/// (credentials allowed), matching the protocol's historical echo-origin
/// behavior rather than a static allowlist.
pub fn build_router(server: Arc<SyncServer>) -> Router {
    let state = AppState { server };

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_methods([Method::GET, Method::POST])
        .allow_credentials(true);

    Router::new()
        .route("/sync", post(handlers::sync))
        .route("/healthz", get(handlers::healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
