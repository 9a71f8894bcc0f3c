use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    common::HttpError,
    protocol::tracks::{LoadResult, Track, TrackInfo},
    server::AppState,
};

#[derive(Debug, Deserialize)]
pub struct LoadTracksQuery {
    pub identifier: String,
}

#[derive(Debug, Deserialize)]
pub struct DecodeTrackQuery {
    pub track: String,
}

/// GET /loadtracks?identifier=...
pub async fn load_tracks(
    Query(params): Query<LoadTracksQuery>,
    State(state): State<Arc<AppState>>,
) -> Json<LoadResult> {
    info!("GET /loadtracks: identifier='{}'", params.identifier);
    let result = state.sources.load(&params.identifier).await;
    debug!(
        "Loaded '{}' as {:?} with {} tracks",
        params.identifier,
        result.load_type,
        result.tracks.len()
    );
    Json(result)
}

/// GET /decodetrack?track=...
pub async fn decode_track(
    Query(params): Query<DecodeTrackQuery>,
) -> Result<Json<TrackInfo>, HttpError> {
    debug!("GET /decodetrack");
    Track::decode(&params.track)
        .map(|track| Json(track.info))
        .map_err(|e| HttpError::bad_request(e.to_string(), "/decodetrack"))
}

/// POST /decodetracks
pub async fn decode_tracks(Json(encoded): Json<Vec<String>>) -> Json<Vec<Track>> {
    debug!("POST /decodetracks: {} tracks", encoded.len());
    let tracks = encoded
        .iter()
        .filter_map(|track| match Track::decode(track) {
            Ok(track) => Some(track),
            Err(e) => {
                warn!("Skipping undecodable track: {}", e);
                None
            }
        })
        .collect();
    Json(tracks)
}
