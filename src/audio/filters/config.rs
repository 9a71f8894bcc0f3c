use serde::{Deserialize, Serialize};

use super::{
    AudioFilter, FilterConfig, channel_mix::ChannelMixFilter, distortion::DistortionFilter,
    equalizer::{self, EqualizerFilter},
    is_set, karaoke::KaraokeFilter, low_pass::LowPassFilter, rotation::RotationFilter,
    timescale::TimescaleFilter, tremolo::TremoloFilter, vibrato::VibratoFilter,
    volume::VolumeFilter,
};
use crate::audio::format::AudioDataFormat;

/// Output gain, 1.0 is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeConfig(pub f32);

impl FilterConfig for VolumeConfig {
    fn is_enabled(&self) -> bool {
        is_set(self.0, 1.0)
    }

    fn build(&self, _format: &AudioDataFormat) -> Option<Box<dyn AudioFilter>> {
        Some(Box::new(VolumeFilter::new(self.0)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqBand {
    pub band: i64,
    pub gain: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EqualizerConfig(pub Vec<EqBand>);

impl EqualizerConfig {
    /// Per-band gains; later entries for the same band win, out-of-range bands are ignored.
    pub fn gains(&self) -> [f32; equalizer::BAND_COUNT] {
        let mut gains = [0.0; equalizer::BAND_COUNT];
        for band in &self.0 {
            if let Some(gain) = usize::try_from(band.band)
                .ok()
                .and_then(|i| gains.get_mut(i))
            {
                *gain = band.gain;
            }
        }
        gains
    }
}

impl FilterConfig for EqualizerConfig {
    fn is_enabled(&self) -> bool {
        self.gains().iter().any(|g| is_set(*g, 0.0))
    }

    fn build(&self, format: &AudioDataFormat) -> Option<Box<dyn AudioFilter>> {
        if format.sample_rate != equalizer::SAMPLE_RATE {
            return None;
        }
        Some(Box::new(EqualizerFilter::new(self.gains(), format.channels)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KaraokeConfig {
    pub level: f32,
    pub mono_level: f32,
    pub filter_band: f32,
    pub filter_width: f32,
}

impl Default for KaraokeConfig {
    fn default() -> Self {
        Self {
            level: 1.0,
            mono_level: 1.0,
            filter_band: 220.0,
            filter_width: 100.0,
        }
    }
}

impl FilterConfig for KaraokeConfig {
    fn is_enabled(&self) -> bool {
        is_set(self.level, 1.0)
            || is_set(self.mono_level, 1.0)
            || is_set(self.filter_band, 220.0)
            || is_set(self.filter_width, 100.0)
    }

    fn build(&self, format: &AudioDataFormat) -> Option<Box<dyn AudioFilter>> {
        (format.channels == 2).then(|| {
            Box::new(KaraokeFilter::new(
                self.level,
                self.mono_level,
                self.filter_band,
                self.filter_width,
                format.sample_rate,
            )) as Box<dyn AudioFilter>
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimescaleConfig {
    pub speed: f64,
    pub pitch: f64,
    pub rate: f64,
}

impl Default for TimescaleConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            pitch: 1.0,
            rate: 1.0,
        }
    }
}

impl TimescaleConfig {
    fn any_set(&self) -> bool {
        [self.speed, self.pitch, self.rate]
            .iter()
            .any(|v| is_set(*v as f32, 1.0))
    }
}

impl FilterConfig for TimescaleConfig {
    /// Without the transform being available, only `is_enabled_with` can say yes.
    fn is_enabled(&self) -> bool {
        self.is_enabled_with(true)
    }

    fn is_enabled_with(&self, timescale_available: bool) -> bool {
        timescale_available && self.any_set()
    }

    fn build(&self, format: &AudioDataFormat) -> Option<Box<dyn AudioFilter>> {
        Some(Box::new(TimescaleFilter::new(
            self.speed,
            self.pitch,
            self.rate,
            format.channels,
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TremoloConfig {
    pub frequency: f32,
    pub depth: f32,
}

impl Default for TremoloConfig {
    fn default() -> Self {
        Self {
            frequency: 2.0,
            depth: 0.5,
        }
    }
}

impl FilterConfig for TremoloConfig {
    fn is_enabled(&self) -> bool {
        is_set(self.frequency, 2.0) || is_set(self.depth, 0.5)
    }

    fn build(&self, format: &AudioDataFormat) -> Option<Box<dyn AudioFilter>> {
        Some(Box::new(TremoloFilter::new(
            self.frequency,
            self.depth,
            format.channels,
            format.sample_rate,
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DistortionConfig {
    pub sin_offset: f32,
    pub sin_scale: f32,
    pub cos_offset: f32,
    pub cos_scale: f32,
    pub tan_offset: f32,
    pub tan_scale: f32,
    pub offset: f32,
    pub scale: f32,
}

impl Default for DistortionConfig {
    fn default() -> Self {
        Self {
            sin_offset: 0.0,
            sin_scale: 1.0,
            cos_offset: 0.0,
            cos_scale: 1.0,
            tan_offset: 0.0,
            tan_scale: 1.0,
            offset: 0.0,
            scale: 1.0,
        }
    }
}

impl FilterConfig for DistortionConfig {
    /// Clients rely on distortion applying whenever it is configured, even at defaults.
    fn is_enabled(&self) -> bool {
        true
    }

    fn build(&self, _format: &AudioDataFormat) -> Option<Box<dyn AudioFilter>> {
        Some(Box::new(DistortionFilter {
            sin_offset: self.sin_offset as f64,
            sin_scale: self.sin_scale as f64,
            cos_offset: self.cos_offset as f64,
            cos_scale: self.cos_scale as f64,
            tan_offset: self.tan_offset as f64,
            tan_scale: self.tan_scale as f64,
            offset: self.offset as f64,
            scale: self.scale as f64,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VibratoConfig {
    pub frequency: f32,
    pub depth: f32,
}

impl Default for VibratoConfig {
    fn default() -> Self {
        Self {
            frequency: 2.0,
            depth: 0.5,
        }
    }
}

impl FilterConfig for VibratoConfig {
    fn is_enabled(&self) -> bool {
        self.depth != 0.0
    }

    fn build(&self, format: &AudioDataFormat) -> Option<Box<dyn AudioFilter>> {
        Some(Box::new(VibratoFilter::new(
            self.frequency,
            self.depth,
            format.channels,
            format.sample_rate,
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LowPassConfig {
    pub smoothing: f32,
}

impl Default for LowPassConfig {
    fn default() -> Self {
        Self { smoothing: 20.0 }
    }
}

impl FilterConfig for LowPassConfig {
    fn is_enabled(&self) -> bool {
        is_set(self.smoothing, 20.0)
    }

    fn build(&self, format: &AudioDataFormat) -> Option<Box<dyn AudioFilter>> {
        Some(Box::new(LowPassFilter::new(self.smoothing, format.channels)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Rotations per second.
    #[serde(rename = "rotationHz", alias = "speed")]
    pub speed: f64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self { speed: 1.0 }
    }
}

impl FilterConfig for RotationConfig {
    fn is_enabled(&self) -> bool {
        is_set(self.speed as f32, 1.0)
    }

    fn build(&self, format: &AudioDataFormat) -> Option<Box<dyn AudioFilter>> {
        (format.channels == 2).then(|| {
            Box::new(RotationFilter::new(self.speed, format.sample_rate)) as Box<dyn AudioFilter>
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChannelMixConfig {
    pub left_to_left: f32,
    pub left_to_right: f32,
    pub right_to_left: f32,
    pub right_to_right: f32,
}

impl Default for ChannelMixConfig {
    fn default() -> Self {
        Self {
            left_to_left: 1.0,
            left_to_right: 0.0,
            right_to_left: 0.0,
            right_to_right: 1.0,
        }
    }
}

impl FilterConfig for ChannelMixConfig {
    fn is_enabled(&self) -> bool {
        is_set(self.left_to_left, 1.0)
            || is_set(self.left_to_right, 0.0)
            || is_set(self.right_to_left, 0.0)
            || is_set(self.right_to_right, 1.0)
    }

    fn build(&self, format: &AudioDataFormat) -> Option<Box<dyn AudioFilter>> {
        (format.channels == 2).then(|| {
            Box::new(ChannelMixFilter::new(
                self.left_to_left,
                self.left_to_right,
                self.right_to_left,
                self.right_to_right,
            )) as Box<dyn AudioFilter>
        })
    }
}
