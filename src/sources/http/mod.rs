mod stream;

use std::{io::Cursor, net::IpAddr, sync::Arc};

use async_trait::async_trait;
use regex::Regex;
use reqwest::{
    Client, Response,
    header::{CONTENT_TYPE, HeaderMap},
};
use symphonia::core::io::MediaSource;
use tracing::{debug, warn};

pub use self::stream::StreamReader;
use crate::{
    audio::{AudioDataFormat, SymphoniaReader, decoder},
    common::{FriendlyException, HttpClient, SourceError},
    protocol::tracks::{LoadResult, STREAM_LENGTH, Track, TrackInfo},
    routeplanner::RoutePlanner,
    sources::{SourcePlugin, plugin::BoxedReader},
};

/// Bodies up to this size are downloaded whole so they can be seeked.
const MAX_BUFFERED_BYTES: u64 = 64 * 1024 * 1024;

/// HTTP/HTTPS Source Plugin
///
/// Handles direct audio file and stream URLs.
pub struct HttpSource {
    url_regex: Regex,
    client: Client,
    planner: Option<Arc<dyn RoutePlanner>>,
}

impl HttpSource {
    pub fn new(planner: Option<Arc<dyn RoutePlanner>>) -> Result<Self, SourceError> {
        Ok(Self {
            url_regex: Regex::new(r"^https?://").map_err(|e| SourceError::Other(e.to_string()))?,
            client: HttpClient::new()?,
            planner,
        })
    }

    fn is_valid_content_type(content_type: &str) -> bool {
        content_type.is_empty()
            || content_type.starts_with("audio/")
            || content_type.starts_with("video/")
            || content_type.starts_with("application/ogg")
            || content_type.starts_with("application/octet-stream")
    }

    /// Issues a GET, binding to the planner's next address when one is configured.
    async fn fetch(&self, url: &str) -> Result<Response, SourceError> {
        let address: Option<IpAddr> = self.planner.as_ref().and_then(|p| p.next_address());
        let client = match address {
            Some(addr) => HttpClient::bound_to(Some(addr))?,
            None => self.client.clone(),
        };

        let response = match client.get(url).header("Accept", "*/*").send().await {
            Ok(response) => response,
            Err(e) => {
                if let (true, Some(addr), Some(planner)) = (e.is_connect(), address, &self.planner) {
                    planner.mark_failed(addr);
                }
                return Err(e.into());
            }
        };

        if !response.status().is_success() {
            return Err(SourceError::Other(format!(
                "server responded with {} for {}",
                response.status(),
                url
            )));
        }
        Ok(response)
    }

    fn is_stream(response: &Response) -> bool {
        response.headers().contains_key("icy-metaint") || response.content_length().is_none()
    }

    /// Turns a response into something symphonia can read: small bodies in
    /// memory, everything else streamed.
    async fn into_media(response: Response) -> Result<Box<dyn MediaSource>, SourceError> {
        match response.content_length() {
            Some(len) if len <= MAX_BUFFERED_BYTES => {
                let body = response.bytes().await?;
                Ok(Box::new(Cursor::new(body.to_vec())))
            }
            _ => Ok(Box::new(StreamReader::spawn(response))),
        }
    }

    async fn resolve(&self, url: &str) -> Result<Option<TrackInfo>, SourceError> {
        let response = self.fetch(url).await?;
        let content_type = header_str(response.headers(), CONTENT_TYPE.as_str())
            .unwrap_or_default()
            .to_lowercase();
        if !Self::is_valid_content_type(&content_type) {
            debug!("Rejecting {} with content type {}", url, content_type);
            return Ok(None);
        }

        let mut info = metadata_from_headers(url, response.headers());
        if Self::is_stream(&response) {
            info.is_stream = true;
            info.is_seekable = false;
            info.length = STREAM_LENGTH;
            return Ok(Some(info));
        }

        let media = Self::into_media(response).await?;
        let ext = decoder::extension_of(url);
        let probed = tokio::task::spawn_blocking(move || decoder::probe(media, ext.as_deref()))
            .await
            .map_err(|e| SourceError::Other(e.to_string()))??;

        if let Some(title) = probed.title {
            info.title = title;
        }
        if let Some(author) = probed.author {
            info.author = author;
        }
        info.length = probed.length.unwrap_or(0);
        Ok(Some(info))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Builds best-effort track info from response headers and the URL itself.
fn metadata_from_headers(url: &str, headers: &HeaderMap) -> TrackInfo {
    let title = header_str(headers, "icy-name")
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            url.split(['?', '#'])
                .next()
                .and_then(|s| s.rsplit('/').next())
                .filter(|s| !s.is_empty())
                .unwrap_or("Unknown title")
                .to_string()
        });

    let author = header_str(headers, "icy-description")
        .filter(|s| !s.is_empty())
        .unwrap_or("Unknown artist")
        .to_string();

    TrackInfo {
        identifier: url.to_string(),
        is_seekable: true,
        author,
        length: 0,
        is_stream: false,
        position: 0,
        title,
        uri: Some(url.to_string()),
        artwork_url: None,
        isrc: None,
        source_name: "http".to_string(),
    }
}

#[async_trait]
impl SourcePlugin for HttpSource {
    fn name(&self) -> &str {
        "http"
    }

    fn can_handle(&self, identifier: &str) -> bool {
        self.url_regex.is_match(identifier)
    }

    async fn load(&self, identifier: &str) -> LoadResult {
        debug!("Probing HTTP source: {}", identifier);

        let result = self.resolve(identifier).await.and_then(|info| {
            info.map(Track::new)
                .transpose()
                .map_err(|e| SourceError::Other(e.to_string()))
        });

        match result {
            Ok(Some(track)) => LoadResult::track(track),
            Ok(None) => LoadResult::no_matches(),
            Err(e) => {
                warn!("Probing failed for {}: {}", identifier, e);
                LoadResult::failed(FriendlyException::new(
                    format!("Failed to load {}: {}", identifier, e),
                    e.severity(),
                ))
            }
        }
    }

    async fn open(
        &self,
        track: &TrackInfo,
        format: AudioDataFormat,
    ) -> Result<BoxedReader, SourceError> {
        let url = track.uri.clone().unwrap_or_else(|| track.identifier.clone());
        let response = self.fetch(&url).await?;
        let media = Self::into_media(response).await?;
        let ext = decoder::extension_of(&url);

        tokio::task::spawn_blocking(move || {
            let reader = SymphoniaReader::new(media, ext.as_deref(), format)?;
            Ok(Box::new(reader) as BoxedReader)
        })
        .await
        .map_err(|e| SourceError::Other(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use axum::{Router, http::header, routing::get};
    use reqwest::header::HeaderValue;

    use super::*;
    use crate::{
        audio::{PcmReader, test_support::wav},
        protocol::tracks::LoadType,
    };

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn handles_only_http_urls() {
        let source = HttpSource::new(None).unwrap();
        assert!(source.can_handle("https://example.com/a.mp3"));
        assert!(source.can_handle("http://example.com/a.mp3"));
        assert!(!source.can_handle("/music/a.mp3"));
        assert!(!source.can_handle("ytsearch:never gonna"));
    }

    #[test]
    fn header_metadata_prefers_icy_fields() {
        let mut headers = HeaderMap::new();
        headers.insert("icy-name", HeaderValue::from_static("Night Radio"));
        let info = metadata_from_headers("http://radio.example/live?token=1", &headers);
        assert_eq!(info.title, "Night Radio");
        assert_eq!(info.author, "Unknown artist");

        let info = metadata_from_headers("http://cdn.example/files/song.ogg?x=y", &HeaderMap::new());
        assert_eq!(info.title, "song.ogg");
    }

    #[tokio::test]
    async fn loads_and_decodes_a_served_file() {
        let body = wav(48_000, 2, 9_600);
        let base = serve(Router::new().route(
            "/clip.wav",
            get(move || {
                let body = body.clone();
                async move { ([(header::CONTENT_TYPE, "audio/wav")], body) }
            }),
        ))
        .await;

        let source = HttpSource::new(None).unwrap();
        let result = source.load(&format!("{base}/clip.wav")).await;
        assert_eq!(result.load_type, LoadType::TrackLoaded);
        let info = &result.tracks[0].info;
        assert_eq!(info.length, 200);
        assert!(!info.is_stream);

        let mut reader = source.open(info, AudioDataFormat::DISCORD_PCM).await.unwrap();
        let mut out = Vec::new();
        while reader.read(&mut out).unwrap() {}
        assert_eq!(out.len(), 9_600 * 2);
    }

    #[tokio::test]
    async fn non_audio_content_is_not_matched() {
        let base = serve(Router::new().route(
            "/page",
            get(|| async { ([(header::CONTENT_TYPE, "text/html")], "<html></html>") }),
        ))
        .await;

        let result = HttpSource::new(None).unwrap().load(&format!("{base}/page")).await;
        assert_eq!(result.load_type, LoadType::NoMatches);
    }

    #[tokio::test]
    async fn error_statuses_fail_the_load() {
        let base = serve(Router::new()).await;
        let result = HttpSource::new(None).unwrap().load(&format!("{base}/missing.mp3")).await;
        assert_eq!(result.load_type, LoadType::LoadFailed);
        assert!(result.exception.is_some());
    }
}
