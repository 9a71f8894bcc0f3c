pub mod biquad;
pub mod channel_mix;
pub mod config;
pub mod delay_line;
pub mod distortion;
pub mod equalizer;
pub mod karaoke;
pub mod lfo;
pub mod low_pass;
pub mod rotation;
pub mod timescale;
pub mod tremolo;
pub mod vibrato;
pub mod volume;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use config::*;

use crate::{audio::format::AudioDataFormat, common::FilterError, configs::FiltersConfig};

/// Float parameters closer than this to their neutral value count as unset.
pub const MINIMUM_FP_DIFF: f32 = 0.01;

pub fn is_set(value: f32, default: f32) -> bool {
    (value - default).abs() >= MINIMUM_FP_DIFF
}

pub(crate) fn clamp_i16(value: f64) -> i16 {
    value.clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

/// A transform over interleaved i16 PCM. May change the buffer length.
pub trait AudioFilter: Send {
    fn process(&mut self, samples: &mut Vec<i16>);
    /// Drop internal state, e.g. after a seek.
    fn reset(&mut self) {}
}

/// One sub-config of a [`FilterChain`].
pub trait FilterConfig {
    fn is_enabled(&self) -> bool;

    /// Enablement when the availability of optional transforms is known.
    fn is_enabled_with(&self, _timescale_available: bool) -> bool {
        self.is_enabled()
    }

    /// `None` when the transform cannot run on `format`.
    fn build(&self, format: &AudioDataFormat) -> Option<Box<dyn AudioFilter>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Volume,
    Equalizer,
    Karaoke,
    Timescale,
    Tremolo,
    Distortion,
    Vibrato,
    LowPass,
    Rotation,
    ChannelMix,
}

impl FilterKind {
    /// Assembly order of the pipeline, independent of how a payload was written.
    pub const ORDER: [FilterKind; 10] = [
        FilterKind::Volume,
        FilterKind::Equalizer,
        FilterKind::Karaoke,
        FilterKind::Timescale,
        FilterKind::Tremolo,
        FilterKind::Distortion,
        FilterKind::Vibrato,
        FilterKind::LowPass,
        FilterKind::Rotation,
        FilterKind::ChannelMix,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FilterKind::Volume => "volume",
            FilterKind::Equalizer => "equalizer",
            FilterKind::Karaoke => "karaoke",
            FilterKind::Timescale => "timescale",
            FilterKind::Tremolo => "tremolo",
            FilterKind::Distortion => "distortion",
            FilterKind::Vibrato => "vibrato",
            FilterKind::LowPass => "lowPass",
            FilterKind::Rotation => "rotation",
            FilterKind::ChannelMix => "channelMix",
        }
    }
}

/// Sparse filter configuration as sent by clients. Absent sub-configs are disabled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterChain {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<VolumeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equalizer: Option<EqualizerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub karaoke: Option<KaraokeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timescale: Option<TimescaleConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tremolo: Option<TremoloConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distortion: Option<DistortionConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vibrato: Option<VibratoConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_pass: Option<LowPassConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<RotationConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_mix: Option<ChannelMixConfig>,
}

impl FilterChain {
    /// Parses a full filters payload. Extra fields such as `op` are ignored.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, FilterError> {
        let chain = Self::deserialize(value)?;
        chain.validate_bands()?;
        Ok(chain)
    }

    pub fn validate_bands(&self) -> Result<(), FilterError> {
        let bands = self.equalizer.iter().flat_map(|eq| eq.0.iter());
        for band in bands {
            if !(0..equalizer::BAND_COUNT as i64).contains(&band.band) {
                return Err(FilterError::BandOutOfRange(band.band, equalizer::BAND_COUNT));
            }
        }
        Ok(())
    }

    pub fn stage(&self, kind: FilterKind) -> Option<&dyn FilterConfig> {
        match kind {
            FilterKind::Volume => self.volume.as_ref().map(|c| c as &dyn FilterConfig),
            FilterKind::Equalizer => self.equalizer.as_ref().map(|c| c as &dyn FilterConfig),
            FilterKind::Karaoke => self.karaoke.as_ref().map(|c| c as &dyn FilterConfig),
            FilterKind::Timescale => self.timescale.as_ref().map(|c| c as &dyn FilterConfig),
            FilterKind::Tremolo => self.tremolo.as_ref().map(|c| c as &dyn FilterConfig),
            FilterKind::Distortion => self.distortion.as_ref().map(|c| c as &dyn FilterConfig),
            FilterKind::Vibrato => self.vibrato.as_ref().map(|c| c as &dyn FilterConfig),
            FilterKind::LowPass => self.low_pass.as_ref().map(|c| c as &dyn FilterConfig),
            FilterKind::Rotation => self.rotation.as_ref().map(|c| c as &dyn FilterConfig),
            FilterKind::ChannelMix => self.channel_mix.as_ref().map(|c| c as &dyn FilterConfig),
        }
    }

    /// Kinds present in the payload, in assembly order.
    pub fn configured(&self) -> impl Iterator<Item = FilterKind> + '_ {
        FilterKind::ORDER
            .into_iter()
            .filter(|kind| self.stage(*kind).is_some())
    }

    pub fn is_enabled(&self) -> bool {
        self.is_enabled_with(true)
    }

    pub fn is_enabled_with(&self, timescale_available: bool) -> bool {
        FilterKind::ORDER.into_iter().any(|kind| {
            self.stage(kind)
                .is_some_and(|c| c.is_enabled_with(timescale_available))
        })
    }
}

/// Names of configured filters the server configuration switched off.
pub fn validate_filters(chain: &FilterChain, config: &FiltersConfig) -> Result<(), FilterError> {
    let disabled: Vec<&'static str> = chain
        .configured()
        .filter(|kind| !config.is_enabled(*kind))
        .map(FilterKind::name)
        .collect();

    if disabled.is_empty() {
        Ok(())
    } else {
        Err(FilterError::Disabled(disabled))
    }
}

struct Stage {
    kind: FilterKind,
    filter: Box<dyn AudioFilter>,
}

/// Active stages built from a [`FilterChain`]. Stages are kept in the order
/// they were built; audio enters at the last-built (outermost) stage and
/// leaves through the first-built one into the sink.
pub struct FilterPipeline {
    stages: Vec<Stage>,
}

impl FilterPipeline {
    pub fn empty() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn build(chain: &FilterChain, format: &AudioDataFormat, timescale_available: bool) -> Self {
        let mut stages = Vec::new();

        for kind in FilterKind::ORDER {
            let Some(config) = chain.stage(kind) else {
                continue;
            };
            if !config.is_enabled_with(timescale_available) {
                continue;
            }

            match config.build(format) {
                Some(filter) => stages.push(Stage { kind, filter }),
                None => debug!(
                    "Skipping {} filter, unsupported for {} channels at {} Hz",
                    kind.name(),
                    format.channels,
                    format.sample_rate
                ),
            }
        }

        Self { stages }
    }

    /// Kinds of the active stages in assembly order.
    pub fn kinds(&self) -> Vec<FilterKind> {
        self.stages.iter().map(|s| s.kind).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn process(&mut self, samples: &mut Vec<i16>) {
        for stage in self.stages.iter_mut().rev() {
            stage.filter.process(samples);
        }
    }

    pub fn reset(&mut self) {
        for stage in self.stages.iter_mut() {
            stage.filter.reset();
        }
    }
}

impl Default for FilterPipeline {
    fn default() -> Self {
        Self::empty()
    }
}
