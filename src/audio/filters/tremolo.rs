use super::{AudioFilter, clamp_i16, lfo::Lfo};

/// LFO-driven amplitude modulation.
pub struct TremoloFilter {
    lfo: Lfo,
    channels: usize,
}

impl TremoloFilter {
    pub fn new(frequency: f32, depth: f32, channels: usize, sample_rate: u32) -> Self {
        Self {
            lfo: Lfo::new(frequency as f64, depth.clamp(0.0, 1.0) as f64, sample_rate),
            channels: channels.max(1),
        }
    }
}

impl AudioFilter for TremoloFilter {
    fn process(&mut self, samples: &mut Vec<i16>) {
        for frame in samples.chunks_mut(self.channels) {
            let gain = self.lfo.next_gain();
            for sample in frame.iter_mut() {
                *sample = clamp_i16(*sample as f64 * gain);
            }
        }
    }

    fn reset(&mut self) {
        self.lfo.reset();
    }
}
