use super::{AudioFilter, clamp_i16};

/// Scales every sample by a float gain.
pub struct VolumeFilter {
  gain: f32,
}

impl VolumeFilter {
  pub fn new(gain: f32) -> Self {
    Self {
      gain: gain.clamp(0.0, 5.0),
    }
  }
}

impl AudioFilter for VolumeFilter {
  fn process(&mut self, samples: &mut Vec<i16>) {
    for sample in samples.iter_mut() {
      *sample = clamp_i16(*sample as f64 * self.gain as f64);
    }
  }
}
