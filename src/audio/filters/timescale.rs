use super::{AudioFilter, clamp_i16};

/// 4-point Catmull-Rom interpolation.
fn cubic_interpolate(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
  let t2 = t * t;
  let t3 = t2 * t;

  0.5
    * (2.0 * p1
      + (-p0 + p2) * t
      + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
      + (-p0 + 3.0 * p1 - 3.0 * p2 + p3) * t3)
}

/// Speed, pitch and rate change by resampling. Output length differs from input;
/// unconsumed input is carried into the next call.
pub struct TimescaleFilter {
  ratio: f64,
  channels: usize,
  carry: Vec<i16>,
  /// Fractional read head relative to the start of `carry`.
  position: f64,
}

impl TimescaleFilter {
  pub fn new(speed: f64, pitch: f64, rate: f64, channels: usize) -> Self {
    let clamp = |v: f64| v.clamp(0.1, 5.0);
    Self {
      ratio: clamp(speed) * clamp(pitch) * clamp(rate),
      channels: channels.max(1),
      carry: Vec::new(),
      position: 0.0,
    }
  }

  fn sample(&self, frame: usize, channel: usize) -> f64 {
    self.carry[frame * self.channels + channel] as f64
  }
}

impl AudioFilter for TimescaleFilter {
  fn process(&mut self, samples: &mut Vec<i16>) {
    self.carry.extend_from_slice(samples);
    samples.clear();

    let frames = self.carry.len() / self.channels;
    loop {
      let whole = self.position as usize;
      if whole + 2 >= frames {
        break;
      }
      let t = self.position - whole as f64;
      let before = whole.saturating_sub(1);

      for c in 0..self.channels {
        let value = cubic_interpolate(
          self.sample(before, c),
          self.sample(whole, c),
          self.sample(whole + 1, c),
          self.sample(whole + 2, c),
          t,
        );
        samples.push(clamp_i16(value));
      }
      self.position += self.ratio;
    }

    // Keep one frame of history for the next interpolation window.
    let consumed = (self.position as usize).saturating_sub(1).min(frames);
    self.carry.drain(..consumed * self.channels);
    self.position -= consumed as f64;
  }

  fn reset(&mut self) {
    self.carry.clear();
    self.position = 0.0;
  }
}
