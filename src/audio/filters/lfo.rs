use std::f64::consts::PI;

const TWO_PI: f64 = 2.0 * PI;

/// Sine low-frequency oscillator shared by tremolo, vibrato and rotation.
pub struct Lfo {
    phase: f64,
    step: f64,
    pub depth: f64,
}

impl Lfo {
    pub fn new(frequency: f64, depth: f64, sample_rate: u32) -> Self {
        Self {
            phase: 0.0,
            step: TWO_PI * frequency / sample_rate as f64,
            depth,
        }
    }

    /// Current sine value in [-1, 1]; advances the phase by one frame.
    pub fn next_value(&mut self) -> f64 {
        let value = self.phase.sin();
        self.phase += self.step;
        if self.phase > TWO_PI {
            self.phase -= TWO_PI;
        }
        value
    }

    /// Amplitude multiplier for tremolo: `1 - depth * (sin + 1) / 2`.
    pub fn next_gain(&mut self) -> f64 {
        1.0 - self.depth * (self.next_value() + 1.0) / 2.0
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}
