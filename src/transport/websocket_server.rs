use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::{
    common::types::{ConnectionId, UserId},
    server::{AppState, Handshake, PendingResume},
    transport::middleware::{Authorization, authorize},
    ws::dispatch,
};

pub const MAJOR_VERSION: &str = "3";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub async fn websocket_handler(
    headers: HeaderMap,
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Result<Response, (StatusCode, &'static str)> {
    match authorize(&headers, state.config.server.password()) {
        Authorization::Granted => {}
        Authorization::Invalid => {
            warn!("Authorization failed: Invalid password provided");
            return Err((StatusCode::UNAUTHORIZED, "Unauthorized"));
        }
        Authorization::Missing => {
            warn!("Authorization failed: Missing Authorization header");
            return Err((StatusCode::UNAUTHORIZED, "Unauthorized"));
        }
    }

    let user_id = header(&headers, "user-id")
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|id| *id != 0)
        .map(UserId::from)
        .ok_or((StatusCode::BAD_REQUEST, "Missing or invalid User-Id header"))?;

    let client_name = header(&headers, "client-name").map(String::from);
    match &client_name {
        Some(name) => info!("Incoming connection from client: {}", name),
        None => debug!("Client connected without 'Client-Name' header"),
    }

    // Claimed now so the response can tell the client whether it resumed.
    let pending = header(&headers, "resume-key").and_then(|key| state.registry.claim(key));
    let resumed = pending.is_some();

    let handshake = Handshake {
        user_id,
        client_name,
    };
    let mut response = ws
        .on_upgrade(move |socket| handle_socket(socket, state, handshake, pending))
        .into_response();

    let headers = response.headers_mut();
    headers.insert(
        "Session-Resumed",
        HeaderValue::from_static(if resumed { "true" } else { "false" }),
    );
    headers.insert("Lavalink-Major-Version", HeaderValue::from_static(MAJOR_VERSION));
    Ok(response)
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    handshake: Handshake,
    pending: Option<PendingResume>,
) {
    let connection_id = ConnectionId::generate();
    let (tx, rx) = flume::unbounded::<String>();
    let (session, resumed) = state
        .registry
        .attach(connection_id.clone(), pending, handshake, tx);
    info!(
        "WebSocket connected: connection={} user={} resumed={}",
        connection_id, session.user_id, resumed
    );

    let (mut sink, mut stream) = socket.split();

    let writer_connection = connection_id.clone();
    let writer = tokio::spawn(async move {
        while let Ok(json) = rx.recv_async().await {
            if let Err(e) = sink.send(Message::Text(json.into())).await {
                warn!("Socket send error: connection={} err={}", writer_connection, e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => dispatch(&session, text.as_str()),
            Ok(Message::Close(frame)) => {
                debug!(
                    "Close frame from connection={}: {:?}",
                    connection_id,
                    frame.map(|f| f.code)
                );
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket error: connection={} err={}", connection_id, e);
                break;
            }
        }
    }

    info!("WebSocket closed: connection={}", connection_id);
    state.registry.disconnect(&connection_id);
    writer.abort();
}
