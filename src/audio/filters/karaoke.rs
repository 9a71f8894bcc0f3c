use super::{
    AudioFilter, clamp_i16,
    biquad::{BiquadCoeffs, BiquadState},
};

const SCALE_16: f64 = 32768.0;

/// Vocal removal: cancels centre-panned content above `filter_band`,
/// keeping the low end intact.
pub struct KaraokeFilter {
    level: f64,
    mono_level: f64,
    lowpass: BiquadCoeffs,
    highpass: BiquadCoeffs,
    lp_states: [BiquadState; 2],
    hp_states: [BiquadState; 2],
}

impl KaraokeFilter {
    pub fn new(
        level: f32,
        mono_level: f32,
        filter_band: f32,
        filter_width: f32,
        sample_rate: u32,
    ) -> Self {
        let rate = sample_rate as f64;
        let band = (filter_band as f64).clamp(1.0, rate * 0.49);
        let q = (band / (filter_width as f64).max(1e-6)).max(1e-4);

        Self {
            level: level.clamp(0.0, 1.0) as f64,
            mono_level: mono_level.clamp(0.0, 1.0) as f64,
            lowpass: BiquadCoeffs::lowpass(band, q, rate),
            highpass: BiquadCoeffs::highpass(band, q, rate),
            lp_states: [BiquadState::default(); 2],
            hp_states: [BiquadState::default(); 2],
        }
    }
}

impl AudioFilter for KaraokeFilter {
    fn process(&mut self, samples: &mut Vec<i16>) {
        for frame in samples.chunks_exact_mut(2) {
            let mut left = frame[0] as f64 / SCALE_16;
            let mut right = frame[1] as f64 / SCALE_16;

            let mid = (left + right) * 0.5 * self.mono_level;
            left -= mid;
            right -= mid;

            let low_left = self.lp_states[0].process(left, &self.lowpass);
            let low_right = self.lp_states[1].process(right, &self.lowpass);
            let high_left = self.hp_states[0].process(left, &self.highpass);
            let high_right = self.hp_states[1].process(right, &self.highpass);

            let side = (high_left - high_right) * self.level;
            frame[0] = clamp_i16((low_left + side) * SCALE_16);
            frame[1] = clamp_i16((low_right - side) * SCALE_16);
        }
    }

    fn reset(&mut self) {
        self.lp_states = [BiquadState::default(); 2];
        self.hp_states = [BiquadState::default(); 2];
    }
}
