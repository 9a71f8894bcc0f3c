use super::{AudioFilter, clamp_i16};

/// Single-pole IIR smoothing; higher smoothing cuts more treble.
pub struct LowPassFilter {
  factor: f64,
  previous: Vec<f64>,
}

impl LowPassFilter {
  pub fn new(smoothing: f32, channels: usize) -> Self {
    Self {
      factor: 1.0 / (smoothing as f64).max(1.0),
      previous: vec![0.0; channels.max(1)],
    }
  }
}

impl AudioFilter for LowPassFilter {
  fn process(&mut self, samples: &mut Vec<i16>) {
    let channels = self.previous.len();
    for frame in samples.chunks_mut(channels) {
      for (sample, previous) in frame.iter_mut().zip(self.previous.iter_mut()) {
        *previous += (*sample as f64 - *previous) * self.factor;
        *sample = clamp_i16(*previous);
      }
    }
  }

  fn reset(&mut self) {
    self.previous.fill(0.0);
  }
}
