use axum::{Router, routing::post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{AppState, get_generate, post_generate, preflight};

/// `/generate` with permissive CORS on every route.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/generate",
            post(post_generate).get(get_generate).options(preflight),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
