use std::{net::IpAddr, sync::Arc};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};

use crate::{
    common::HttpError,
    protocol::routeplanner::{FreeAddressRequest, RoutePlannerStatus},
    routeplanner::RoutePlanner,
    server::AppState,
};

const DISABLED: &str = "Can't access disabled route planner";

fn planner<'a>(
    state: &'a AppState,
    path: &str,
) -> Result<&'a Arc<dyn RoutePlanner>, HttpError> {
    state
        .routeplanner
        .as_ref()
        .ok_or_else(|| HttpError::internal(DISABLED, path))
}

/// GET /routeplanner/status
pub async fn routeplanner_status(State(state): State<Arc<AppState>>) -> Json<RoutePlannerStatus> {
    tracing::debug!("GET /routeplanner/status");
    Json(
        state
            .routeplanner
            .as_ref()
            .map(|rp| rp.status())
            .unwrap_or_default(),
    )
}

/// POST /routeplanner/free/address
pub async fn routeplanner_free_address(
    State(state): State<Arc<AppState>>,
    Json(body): Json<FreeAddressRequest>,
) -> Result<impl IntoResponse, HttpError> {
    const PATH: &str = "/routeplanner/free/address";
    tracing::info!("POST {}: address='{}'", PATH, body.address);

    let rp = planner(&state, PATH)?;
    let address: IpAddr = body
        .address
        .trim()
        .parse()
        .map_err(|_| HttpError::bad_request(format!("Invalid address '{}'", body.address), PATH))?;
    rp.free_address(address);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /routeplanner/free/all
pub async fn routeplanner_free_all(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    tracing::info!("POST /routeplanner/free/all");
    planner(&state, "/routeplanner/free/all")?.free_all_addresses();
    Ok(StatusCode::NO_CONTENT)
}
