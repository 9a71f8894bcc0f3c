use super::{AudioFilter, clamp_i16, lfo::Lfo};

/// Pans stereo audio around the listener.
pub struct RotationFilter {
    lfo: Lfo,
}

impl RotationFilter {
    pub fn new(rotation_hz: f64, sample_rate: u32) -> Self {
        Self {
            lfo: Lfo::new(rotation_hz, 1.0, sample_rate),
        }
    }
}

impl AudioFilter for RotationFilter {
    fn process(&mut self, samples: &mut Vec<i16>) {
        for frame in samples.chunks_exact_mut(2) {
            let pan = self.lfo.next_value();
            frame[0] = clamp_i16(frame[0] as f64 * (1.0 - pan) / 2.0);
            frame[1] = clamp_i16(frame[1] as f64 * (1.0 + pan) / 2.0);
        }
    }

    fn reset(&mut self) {
        self.lfo.reset();
    }
}
