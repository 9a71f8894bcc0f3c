use std::f64::consts::PI;

/// Biquad coefficients, normalized by a0.
#[derive(Clone, Copy)]
pub struct BiquadCoeffs {
  pub b0: f64,
  pub b1: f64,
  pub b2: f64,
  pub a1: f64,
  pub a2: f64,
}

/// Direct Form I state for one channel.
#[derive(Clone, Copy, Default)]
pub struct BiquadState {
  x1: f64,
  x2: f64,
  y1: f64,
  y2: f64,
}

impl BiquadCoeffs {
  pub fn lowpass(freq: f64, q: f64, sample_rate: f64) -> Self {
    let (cos_w0, alpha) = Self::prewarp(freq, q, sample_rate);
    let inv_a0 = 1.0 / (1.0 + alpha);
    Self {
      b0: (1.0 - cos_w0) * 0.5 * inv_a0,
      b1: (1.0 - cos_w0) * inv_a0,
      b2: (1.0 - cos_w0) * 0.5 * inv_a0,
      a1: -2.0 * cos_w0 * inv_a0,
      a2: (1.0 - alpha) * inv_a0,
    }
  }

  pub fn highpass(freq: f64, q: f64, sample_rate: f64) -> Self {
    let (cos_w0, alpha) = Self::prewarp(freq, q, sample_rate);
    let inv_a0 = 1.0 / (1.0 + alpha);
    Self {
      b0: (1.0 + cos_w0) * 0.5 * inv_a0,
      b1: -(1.0 + cos_w0) * inv_a0,
      b2: (1.0 + cos_w0) * 0.5 * inv_a0,
      a1: -2.0 * cos_w0 * inv_a0,
      a2: (1.0 - alpha) * inv_a0,
    }
  }

  fn prewarp(freq: f64, q: f64, sample_rate: f64) -> (f64, f64) {
    let w0 = 2.0 * PI * freq / sample_rate;
    (w0.cos(), w0.sin() / (2.0 * q))
  }
}

impl BiquadState {
  pub fn process(&mut self, input: f64, c: &BiquadCoeffs) -> f64 {
    let output = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;

    if !output.is_finite() {
      *self = Self::default();
      return 0.0;
    }

    self.x2 = self.x1;
    self.x1 = input;
    self.y2 = self.y1;
    self.y1 = output;
    output
  }
}
