use std::sync::Arc;

use tracing::{debug, info};

use super::{
    http::HttpSource,
    local::LocalSource,
    plugin::{BoxedReader, BoxedSource},
};
use crate::{
    audio::AudioDataFormat,
    common::SourceError,
    configs::SourcesConfig,
    protocol::tracks::{LoadResult, TrackInfo},
    routeplanner::RoutePlanner,
};

/// Source Manager
pub struct SourceManager {
    sources: Vec<BoxedSource>,
}

impl SourceManager {
    /// Registers the built-in sources enabled in `config`.
    pub fn new(config: &SourcesConfig, planner: Option<Arc<dyn RoutePlanner>>) -> Self {
        let mut sources: Vec<BoxedSource> = Vec::new();

        if config.http {
            match HttpSource::new(planner) {
                Ok(src) => {
                    info!("Loaded source: http");
                    sources.push(Box::new(src));
                }
                Err(e) => tracing::error!("http source failed to initialize: {}", e),
            }
        }

        if config.local {
            info!("Loaded source: local");
            sources.push(Box::new(LocalSource::new()));
        }

        Self { sources }
    }

    pub fn with_sources(sources: Vec<BoxedSource>) -> Self {
        Self { sources }
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Load tracks using the first matching source
    pub async fn load(&self, identifier: &str) -> LoadResult {
        let identifier = identifier.trim();
        for source in &self.sources {
            if source.can_handle(identifier) {
                tracing::trace!("Loading '{}' with source: {}", identifier, source.name());
                return source.load(identifier).await;
            }
        }

        debug!("No source could handle identifier: {}", identifier);
        LoadResult::no_matches()
    }

    /// Opens a track with the source that produced it.
    pub async fn open(
        &self,
        track: &TrackInfo,
        format: AudioDataFormat,
    ) -> Result<BoxedReader, SourceError> {
        let source = self
            .sources
            .iter()
            .find(|s| s.name() == track.source_name)
            .ok_or_else(|| SourceError::NoSource(track.source_name.clone()))?;
        source.open(track, format).await
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::{
        audio::PcmReader,
        protocol::tracks::{LoadType, Track},
        sources::SourcePlugin,
    };

    struct Fixed(&'static str);

    #[async_trait]
    impl SourcePlugin for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn can_handle(&self, identifier: &str) -> bool {
            identifier.starts_with(self.0)
        }

        async fn load(&self, identifier: &str) -> LoadResult {
            let info = TrackInfo {
                identifier: identifier.into(),
                title: self.0.into(),
                source_name: self.0.into(),
                ..Default::default()
            };
            LoadResult::track(Track::new(info).unwrap())
        }

        async fn open(
            &self,
            _track: &TrackInfo,
            _format: AudioDataFormat,
        ) -> Result<BoxedReader, SourceError> {
            Ok(Box::new(crate::audio::test_support::VecReader::constant(0, 20)) as Box<dyn PcmReader>)
        }
    }

    fn manager() -> SourceManager {
        SourceManager::with_sources(vec![Box::new(Fixed("a")), Box::new(Fixed("ab"))])
    }

    #[tokio::test]
    async fn first_matching_source_wins() {
        let result = manager().load("abc").await;
        assert_eq!(result.load_type, LoadType::TrackLoaded);
        assert_eq!(result.tracks[0].info.title, "a");
    }

    #[tokio::test]
    async fn unmatched_identifiers_yield_no_matches() {
        let result = manager().load("zzz").await;
        assert_eq!(result.load_type, LoadType::NoMatches);
        assert!(result.tracks.is_empty());
    }

    #[tokio::test]
    async fn open_routes_by_source_name() {
        let manager = manager();
        let info = TrackInfo {
            source_name: "ab".into(),
            ..Default::default()
        };
        assert!(manager.open(&info, AudioDataFormat::DISCORD_PCM).await.is_ok());

        let info = TrackInfo {
            source_name: "youtube".into(),
            ..Default::default()
        };
        assert!(matches!(
            manager.open(&info, AudioDataFormat::DISCORD_PCM).await,
            Err(SourceError::NoSource(_))
        ));
    }
}
