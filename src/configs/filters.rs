use serde::{Deserialize, Serialize};

use crate::audio::filters::FilterKind;

/// Per-filter switches. A disabled filter is rejected when a client configures it.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FiltersConfig {
    #[serde(default = "default_true")]
    pub volume: bool,
    #[serde(default = "default_true")]
    pub equalizer: bool,
    #[serde(default = "default_true")]
    pub karaoke: bool,
    #[serde(default = "default_true")]
    pub timescale: bool,
    #[serde(default = "default_true")]
    pub tremolo: bool,
    #[serde(default = "default_true")]
    pub distortion: bool,
    #[serde(default = "default_true")]
    pub vibrato: bool,
    #[serde(default = "default_true")]
    pub low_pass: bool,
    #[serde(default = "default_true")]
    pub rotation: bool,
    #[serde(default = "default_true")]
    pub channel_mix: bool,
    /// Whether the time-stretching transform is present in this build.
    #[serde(default = "default_true")]
    pub timescale_available: bool,
}

fn default_true() -> bool {
    true
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            volume: true,
            equalizer: true,
            karaoke: true,
            timescale: true,
            tremolo: true,
            distortion: true,
            vibrato: true,
            low_pass: true,
            rotation: true,
            channel_mix: true,
            timescale_available: true,
        }
    }
}

impl FiltersConfig {
    pub fn is_enabled(&self, kind: FilterKind) -> bool {
        match kind {
            FilterKind::Volume => self.volume,
            FilterKind::Equalizer => self.equalizer,
            FilterKind::Karaoke => self.karaoke,
            FilterKind::Timescale => self.timescale,
            FilterKind::Tremolo => self.tremolo,
            FilterKind::Distortion => self.distortion,
            FilterKind::Vibrato => self.vibrato,
            FilterKind::LowPass => self.low_pass,
            FilterKind::Rotation => self.rotation,
            FilterKind::ChannelMix => self.channel_mix,
        }
    }
}
