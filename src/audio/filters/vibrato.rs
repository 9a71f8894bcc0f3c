use super::{AudioFilter, clamp_i16, delay_line::DelayLine, lfo::Lfo};

const MAX_DELAY_MS: f64 = 20.0;

/// LFO-driven delay modulation.
pub struct VibratoFilter {
    lfo: Lfo,
    delays: Vec<DelayLine>,
    max_width: f64,
}

impl VibratoFilter {
    pub fn new(frequency: f32, depth: f32, channels: usize, sample_rate: u32) -> Self {
        let depth = depth.clamp(0.0, 1.0) as f64;
        let buffer_size = (sample_rate as f64 * MAX_DELAY_MS / 1000.0).ceil() as usize;

        Self {
            lfo: Lfo::new(frequency.clamp(0.0, 14.0) as f64, depth, sample_rate),
            delays: (0..channels.max(1)).map(|_| DelayLine::new(buffer_size)).collect(),
            max_width: depth * sample_rate as f64 * 0.005,
        }
    }
}

impl AudioFilter for VibratoFilter {
    fn process(&mut self, samples: &mut Vec<i16>) {
        let channels = self.delays.len();
        for frame in samples.chunks_mut(channels) {
            let delay = self.max_width + self.lfo.next_value() * self.max_width;
            for (sample, line) in frame.iter_mut().zip(self.delays.iter_mut()) {
                line.write(*sample as f32);
                *sample = clamp_i16(line.read(delay) as f64);
            }
        }
    }

    fn reset(&mut self) {
        self.lfo.reset();
        self.delays.iter_mut().for_each(DelayLine::clear);
    }
}
