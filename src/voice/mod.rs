//! The seam between players and whatever carries their audio to the voice service.
//!
//! Players never build voice packets. They obtain a [`MediaConnection`] for
//! their guild, hand it a [`FrameProvider`] and listen for [`VoiceEvent`]s.

pub mod local;
pub mod manager;

use std::sync::Arc;

use serde::Deserialize;

pub use local::LocalVoiceClient;
pub use manager::VoiceConnectionManager;

use crate::common::types::{GuildId, UserId};

/// Target of a voice connection, as relayed from the client's `voiceUpdate`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceServerInfo {
    pub session_id: String,
    pub endpoint: String,
    pub token: String,
}

/// Pulled once per 20 ms frame by the transport.
pub trait FrameProvider: Send + Sync {
    /// Interleaved 48 kHz stereo samples for one frame, or `None` when nothing is playing.
    fn provide_frame(&self) -> Option<Vec<i16>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    Closed {
        code: u16,
        reason: String,
        by_remote: bool,
    },
}

/// One guild's transport handle.
pub trait MediaConnection: Send + Sync {
    fn connect(&self, info: VoiceServerInfo);
    fn set_provider(&self, provider: Option<Arc<dyn FrameProvider>>);
    fn is_connected(&self) -> bool;
    /// Idempotent. Drops the provider and stops pulling frames.
    fn close(&self);
}

pub trait VoiceClient: Send + Sync {
    fn create_connection(
        &self,
        guild_id: &GuildId,
        user_id: UserId,
        events: flume::Sender<VoiceEvent>,
    ) -> Arc<dyn MediaConnection>;
}
