use super::{AudioFilter, clamp_i16};

/// 2x2 matrix mixing of the left and right channels.
pub struct ChannelMixFilter {
  left_to_left: f64,
  left_to_right: f64,
  right_to_left: f64,
  right_to_right: f64,
}

impl ChannelMixFilter {
  pub fn new(left_to_left: f32, left_to_right: f32, right_to_left: f32, right_to_right: f32) -> Self {
    Self {
      left_to_left: left_to_left.clamp(0.0, 1.0) as f64,
      left_to_right: left_to_right.clamp(0.0, 1.0) as f64,
      right_to_left: right_to_left.clamp(0.0, 1.0) as f64,
      right_to_right: right_to_right.clamp(0.0, 1.0) as f64,
    }
  }
}

impl AudioFilter for ChannelMixFilter {
  fn process(&mut self, samples: &mut Vec<i16>) {
    for frame in samples.chunks_exact_mut(2) {
      let left = frame[0] as f64;
      let right = frame[1] as f64;
      frame[0] = clamp_i16(left * self.left_to_left + right * self.right_to_left);
      frame[1] = clamp_i16(left * self.left_to_right + right * self.right_to_right);
    }
  }
}
