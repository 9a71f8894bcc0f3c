use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::now_ms;

/// Exception severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Common,
    Suspicious,
    Fault,
}

/// A failure that is reported to clients rather than thrown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendlyException {
    pub message: String,
    pub severity: Severity,
}

impl FriendlyException {
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }
}

/// Inbound websocket message could not be decoded or routed.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("message has no 'op' field")]
    MissingOp,
    #[error("unknown op '{0}'")]
    UnknownOp(String),
    #[error("invalid guild id '{0}'")]
    InvalidGuild(String),
    #[error(transparent)]
    Filters(#[from] FilterError),
    #[error(transparent)]
    Track(#[from] TrackCodecError),
    #[error("session is terminated")]
    SessionClosed,
}

/// A filters payload was rejected; the player keeps its previous filters.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("malformed filters payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("equalizer band {0} is out of range (0..{1})")]
    BandOutOfRange(i64, usize),
    #[error("filters disabled by the server configuration: {}", .0.join(", "))]
    Disabled(Vec<&'static str>),
}

/// An encoded track could not be decoded, or a track could not be encoded.
#[derive(Debug, Error)]
pub enum TrackCodecError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("track message is truncated")]
    Truncated,
    #[error("unsupported track message version {0}")]
    UnsupportedVersion(u8),
    #[error("track message contains invalid UTF-8")]
    InvalidUtf8,
    #[error("field of {0} bytes does not fit in a track message")]
    FieldTooLong(usize),
}

impl From<std::io::Error> for TrackCodecError {
    fn from(_: std::io::Error) -> Self {
        Self::Truncated
    }
}

/// Resolving or opening a track failed.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no source can handle '{0}'")]
    NoSource(String),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported or corrupt audio: {0}")]
    Decode(#[from] symphonia::core::errors::Error),
    #[error("{0}")]
    Other(String),
}

impl SourceError {
    pub fn severity(&self) -> Severity {
        match self {
            Self::NoSource(_) | Self::Decode(_) => Severity::Common,
            Self::Http(_) | Self::Io(_) => Severity::Suspicious,
            Self::Other(_) => Severity::Fault,
        }
    }

    pub fn to_friendly(&self) -> FriendlyException {
        FriendlyException::new(self.to_string(), self.severity())
    }
}

/// JSON error body returned by the HTTP routes.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpError {
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
    /// HTTP status code.
    pub status: u16,
    /// HTTP status reason phrase (e.g. "Bad Request").
    pub error: String,
    pub message: String,
    /// The request path that caused the error.
    pub path: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            timestamp: now_ms(),
            status: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Unknown").into(),
            message: message.into(),
            path: path.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, path)
    }

    pub fn internal(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message, path)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_serializes_upper_case() {
        let json = serde_json::to_string(&FriendlyException::new("boom", Severity::Suspicious))
            .unwrap();
        assert_eq!(json, r#"{"message":"boom","severity":"SUSPICIOUS"}"#);
    }

    #[test]
    fn http_error_carries_reason_phrase() {
        let err = HttpError::bad_request("bad track", "/decodetrack");
        assert_eq!(err.status, 400);
        assert_eq!(err.error, "Bad Request");
        assert_eq!(err.path, "/decodetrack");
    }
}
