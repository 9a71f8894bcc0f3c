use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::server::AppState;

pub const API_VERSION_HEADER: &str = "Lavalink-Api-Version";
pub const API_VERSION: &str = "3";

/// Result of comparing the `Authorization` header with the configured password.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Granted,
    Missing,
    Invalid,
}

pub fn authorize(headers: &HeaderMap, password: Option<&str>) -> Authorization {
    let Some(password) = password else {
        return Authorization::Granted;
    };
    match headers.get("authorization").and_then(|h| h.to_str().ok()) {
        Some(auth) if auth == password => Authorization::Granted,
        Some(_) => Authorization::Invalid,
        None => Authorization::Missing,
    }
}

pub async fn check_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    match authorize(req.headers(), state.config.server.password()) {
        Authorization::Granted => Ok(next.run(req).await),
        Authorization::Invalid => {
            warn!("REST Authorization failed: Invalid password on {}", req.uri().path());
            Err(StatusCode::FORBIDDEN)
        }
        Authorization::Missing => {
            warn!("REST Authorization failed: Missing Authorization header on {}", req.uri().path());
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

pub async fn add_response_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert(API_VERSION_HEADER, HeaderValue::from_static(API_VERSION));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(auth: Option<&'static str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(auth) = auth {
            headers.insert("authorization", HeaderValue::from_static(auth));
        }
        headers
    }

    #[test]
    fn no_password_grants_everyone() {
        assert_eq!(authorize(&headers(None), None), Authorization::Granted);
        assert_eq!(authorize(&headers(Some("x")), None), Authorization::Granted);
    }

    #[test]
    fn password_must_match() {
        let password = Some("secret");
        assert_eq!(authorize(&headers(Some("secret")), password), Authorization::Granted);
        assert_eq!(authorize(&headers(Some("nope")), password), Authorization::Invalid);
        assert_eq!(authorize(&headers(None), password), Authorization::Missing);
    }
}
