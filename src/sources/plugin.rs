use async_trait::async_trait;

use crate::{
    audio::{AudioDataFormat, PcmReader},
    common::SourceError,
    protocol::tracks::{LoadResult, TrackInfo},
};

pub type BoxedSource = Box<dyn SourcePlugin>;
pub type BoxedReader = Box<dyn PcmReader>;

/// Trait that all source plugins must implement.
///
/// A plugin resolves identifiers into tracks and later opens those tracks
/// for decoding when a player starts them.
#[async_trait]
pub trait SourcePlugin: Send + Sync {
    /// Unique identifier for this source, stored as `sourceName` on its tracks.
    fn name(&self) -> &str;

    /// Check if this source can handle the given identifier.
    fn can_handle(&self, identifier: &str) -> bool;

    /// Resolve the identifier into track(s).
    ///
    /// Failures are reported inside the result, never as an `Err`.
    async fn load(&self, identifier: &str) -> LoadResult;

    /// Open a previously loaded track, producing PCM in `format`.
    async fn open(
        &self,
        track: &TrackInfo,
        format: AudioDataFormat,
    ) -> Result<BoxedReader, SourceError>;
}
