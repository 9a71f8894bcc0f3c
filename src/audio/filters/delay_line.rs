/// Circular buffer delay line used by the vibrato filter.
pub struct DelayLine {
  buffer: Vec<f32>,
  write_index: usize,
}

impl DelayLine {
  pub fn new(size: usize) -> Self {
    Self {
      buffer: vec![0.0; size.max(2)],
      write_index: 0,
    }
  }

  pub fn write(&mut self, sample: f32) {
    self.buffer[self.write_index] = sample;
    self.write_index = (self.write_index + 1) % self.buffer.len();
  }

  /// Reads `delay` samples back with linear interpolation.
  pub fn read(&self, delay: f64) -> f32 {
    let size = self.buffer.len();
    let delay = delay.clamp(0.0, (size - 2) as f64);
    let whole = delay as usize;
    let frac = delay - whole as f64;

    let idx0 = (self.write_index + size - 1 - whole) % size;
    let idx1 = (self.write_index + size - 2 - whole) % size;

    let s0 = self.buffer[idx0] as f64;
    let s1 = self.buffer[idx1] as f64;
    (s0 * (1.0 - frac) + s1 * frac) as f32
  }

  pub fn clear(&mut self) {
    self.buffer.fill(0.0);
  }
}
