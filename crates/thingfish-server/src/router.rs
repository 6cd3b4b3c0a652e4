use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use thingfish_handler::Handler;
use tower_http::trace::TraceLayer;

use crate::handler;

/// Build the axum router with all ThingFish endpoints.
pub fn build_router(state: Handler, max_body_size: usize) -> Router {
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/", post(handler::create_object))
        .route("/search", get(handler::search))
        .route(
            "/:oid",
            get(handler::fetch_object)
                .put(handler::replace_object)
                .delete(handler::delete_object),
        )
        .route(
            "/:oid/metadata",
            get(handler::fetch_metadata)
                .put(handler::replace_metadata)
                .post(handler::merge_metadata)
                .delete(handler::reset_metadata),
        )
        .route("/:oid/metadata/:key", delete(handler::remove_property))
        .route("/:oid/related", get(handler::related))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
