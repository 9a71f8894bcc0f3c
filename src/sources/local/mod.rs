use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    audio::{AudioDataFormat, SymphoniaReader, decoder},
    common::{FriendlyException, Severity, SourceError},
    protocol::tracks::{LoadResult, Track, TrackInfo},
    sources::{SourcePlugin, plugin::BoxedReader},
};

/// Plays audio files from the node's own filesystem.
pub struct LocalSource;

impl LocalSource {
    pub fn new() -> Self {
        Self
    }

    fn path_of(identifier: &str) -> &str {
        identifier.strip_prefix("file://").unwrap_or(identifier)
    }

    fn probe_file(path: &str) -> Result<TrackInfo, SourceError> {
        let file = std::fs::File::open(path)?;
        let ext = decoder::extension_of(path);
        let meta = decoder::probe(Box::new(file), ext.as_deref())?;

        // Fallback: use the filename without extension as the title
        let title = meta.title.unwrap_or_else(|| {
            Path::new(path)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("Unknown")
                .to_string()
        });

        Ok(TrackInfo {
            identifier: path.to_string(),
            is_seekable: true,
            author: meta.author.unwrap_or_else(|| "Unknown Artist".to_string()),
            length: meta.length.unwrap_or(0),
            is_stream: false,
            position: 0,
            title,
            uri: Some(format!("file://{}", path)),
            source_name: "local".to_string(),
            artwork_url: None,
            isrc: None,
        })
    }
}

impl Default for LocalSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourcePlugin for LocalSource {
    fn name(&self) -> &str {
        "local"
    }

    fn can_handle(&self, identifier: &str) -> bool {
        Path::new(Self::path_of(identifier)).is_file()
    }

    async fn load(&self, identifier: &str) -> LoadResult {
        let path = Self::path_of(identifier).to_string();
        debug!("Local source probing file: {}", path);

        let probe_path = path.clone();
        let result = tokio::task::spawn_blocking(move || LocalSource::probe_file(&probe_path))
            .await
            .unwrap_or_else(|e| Err(SourceError::Other(e.to_string())));

        let track = result.and_then(|info| {
            Track::new(info).map_err(|e| SourceError::Other(e.to_string()))
        });

        match track {
            Ok(track) => LoadResult::track(track),
            Err(e) => {
                warn!("Local source: failed to probe '{}': {}", path, e);
                LoadResult::failed(FriendlyException::new(
                    format!("Failed to load local file: {}", e),
                    Severity::Suspicious,
                ))
            }
        }
    }

    async fn open(
        &self,
        track: &TrackInfo,
        format: AudioDataFormat,
    ) -> Result<BoxedReader, SourceError> {
        let path = Self::path_of(&track.identifier).to_string();
        tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&path)?;
            let ext = decoder::extension_of(&path);
            let reader = SymphoniaReader::new(Box::new(file), ext.as_deref(), format)?;
            Ok(Box::new(reader) as BoxedReader)
        })
        .await
        .map_err(|e| SourceError::Other(e.to_string()))?
    }
}
