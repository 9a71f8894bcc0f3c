use super::{AudioFilter, clamp_i16};

pub const BAND_COUNT: usize = 15;
/// Sample rate the coefficient table was computed for.
pub const SAMPLE_RATE: u32 = 48_000;

struct Coefficients {
    beta: f32,
    alpha: f32,
    gamma: f32,
}

// beta, alpha, gamma per band
const COEFFICIENTS_48000: [Coefficients; BAND_COUNT] = [
    Coefficients { beta: 9.9847546664e-01, alpha: 7.6226668143e-04, gamma: 1.9984647656e+00 },
    Coefficients { beta: 9.9756184654e-01, alpha: 1.2190767289e-03, gamma: 1.9975344645e+00 },
    Coefficients { beta: 9.9616261379e-01, alpha: 1.9186931041e-03, gamma: 1.9960947369e+00 },
    Coefficients { beta: 9.9391578543e-01, alpha: 3.0421072865e-03, gamma: 1.9937449618e+00 },
    Coefficients { beta: 9.9028307215e-01, alpha: 4.8584639242e-03, gamma: 1.9898465702e+00 },
    Coefficients { beta: 9.8485897264e-01, alpha: 7.5705136795e-03, gamma: 1.9837962543e+00 },
    Coefficients { beta: 9.7588512657e-01, alpha: 1.2057436715e-02, gamma: 1.9731772447e+00 },
    Coefficients { beta: 9.6228521814e-01, alpha: 1.8857390928e-02, gamma: 1.9556164694e+00 },
    Coefficients { beta: 9.4080933132e-01, alpha: 2.9595334338e-02, gamma: 1.9242054384e+00 },
    Coefficients { beta: 9.0702059196e-01, alpha: 4.6489704022e-02, gamma: 1.8653476166e+00 },
    Coefficients { beta: 8.5868004289e-01, alpha: 7.0659978553e-02, gamma: 1.7600401337e+00 },
    Coefficients { beta: 7.8409610788e-01, alpha: 1.0795194606e-01, gamma: 1.5450725522e+00 },
    Coefficients { beta: 6.8332861002e-01, alpha: 1.5833569499e-01, gamma: 1.1426447155e+00 },
    Coefficients { beta: 5.5267518228e-01, alpha: 2.2366240886e-01, gamma: 4.0186190803e-01 },
    Coefficients { beta: 4.1811888447e-01, alpha: 2.9094055777e-01, gamma: -7.0905944223e-01 },
];

#[derive(Clone, Copy, Default)]
struct BandState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl BandState {
    fn process(&mut self, sample: f32, coeffs: &Coefficients) -> f32 {
        let mut result =
            coeffs.alpha * (sample - self.x2) + coeffs.gamma * self.y1 - coeffs.beta * self.y2;
        if !result.is_finite() {
            result = 0.0;
        }

        self.x2 = self.x1;
        self.x1 = sample;
        self.y2 = self.y1;
        self.y1 = result;
        result
    }
}

/// 15-band graphic equalizer with fixed 48 kHz coefficients.
pub struct EqualizerFilter {
    gains: [f32; BAND_COUNT],
    /// One state row per channel.
    states: Vec<[BandState; BAND_COUNT]>,
}

impl EqualizerFilter {
    pub fn new(gains: [f32; BAND_COUNT], channels: usize) -> Self {
        Self {
            gains: gains.map(|g| g.clamp(-0.25, 1.0)),
            states: vec![[BandState::default(); BAND_COUNT]; channels.max(1)],
        }
    }
}

impl AudioFilter for EqualizerFilter {
    fn process(&mut self, samples: &mut Vec<i16>) {
        let channels = self.states.len();
        for frame in samples.chunks_mut(channels) {
            for (sample, bands) in frame.iter_mut().zip(self.states.iter_mut()) {
                let input = *sample as f32 / 32768.0;
                let mut result = input * 0.25;
                for (band, state) in bands.iter_mut().enumerate() {
                    let filtered = state.process(input, &COEFFICIENTS_48000[band]);
                    result += filtered * self.gains[band];
                }
                *sample = clamp_i16((result * 4.0).clamp(-1.0, 1.0) as f64 * 32767.0);
            }
        }
    }

    fn reset(&mut self) {
        for row in self.states.iter_mut() {
            *row = [BandState::default(); BAND_COUNT];
        }
    }
}
