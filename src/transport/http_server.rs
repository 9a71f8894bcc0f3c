use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{
    server::AppState,
    transport::{
        middleware::{add_response_headers, check_auth},
        routes::{info, routeplanner, tracks},
        websocket_server::websocket_handler,
    },
};

pub fn router(state: Arc<AppState>) -> Router {
    let rest_routes = Router::new()
        .route("/version", get(info::get_version))
        .route("/loadtracks", get(tracks::load_tracks))
        .route("/decodetrack", get(tracks::decode_track))
        .route("/decodetracks", post(tracks::decode_tracks))
        .route("/routeplanner/status", get(routeplanner::routeplanner_status))
        .route(
            "/routeplanner/free/address",
            post(routeplanner::routeplanner_free_address),
        )
        .route("/routeplanner/free/all", post(routeplanner::routeplanner_free_all))
        .layer(middleware::from_fn_with_state(state.clone(), check_auth));

    // The websocket handshake authorizes on its own.
    Router::new()
        .route("/", get(websocket_handler))
        .merge(rest_routes)
        .layer(middleware::from_fn(add_response_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
