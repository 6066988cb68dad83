//! Route table, grounded on the teacher's `api/routes.rs`
//! `Router::new().nest(...).route(...).with_state(...)` composition.
//!
//! Layout follows spec §6: link management under
//! `Config::base_route_prefix`, with the bare `GET /{shortUri}` redirect
//! mounted at the root so shortened URLs stay short.

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    create_link, create_link_batch, health, metrics, page_link, recover_from_recycle_bin,
    redirect, remove_from_recycle_bin, save_to_recycle_bin, update_link,
};
use super::state::AppState;

fn link_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_link))
        .route("/batch", post(create_link_batch))
        .route("/", put(update_link))
        .route("/page", get(page_link))
        .route("/recycle-bin/:id", post(save_to_recycle_bin))
        .route("/recycle-bin/:id/remove", post(remove_from_recycle_bin))
        .route("/recycle-bin/:id/recover", post(recover_from_recycle_bin))
}

/// Builds the full application router: link management under the
/// configured API prefix, the bare redirect route at `/:shortUri`, and an
/// unauthenticated `/health` probe.
pub fn build_router(state: AppState) -> Router {
    let prefix = state.config.base_route_prefix.clone();

    Router::new()
        .nest(&prefix, link_routes())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/:short_uri", get(redirect))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
}
