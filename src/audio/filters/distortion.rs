use super::{AudioFilter, clamp_i16};

const MAX_INT_16: f64 = 32767.0;

/// Wave shaping through sin/cos/tan terms with offsets and scales.
pub struct DistortionFilter {
    pub(crate) sin_offset: f64,
    pub(crate) sin_scale: f64,
    pub(crate) cos_offset: f64,
    pub(crate) cos_scale: f64,
    pub(crate) tan_offset: f64,
    pub(crate) tan_scale: f64,
    pub(crate) offset: f64,
    pub(crate) scale: f64,
}

impl DistortionFilter {
    fn shape(&self, normalized: f64) -> f64 {
        let mut distorted = 0.0;
        if self.sin_scale != 0.0 {
            distorted += (normalized * self.sin_scale + self.sin_offset).sin();
        }
        if self.cos_scale != 0.0 {
            distorted += (normalized * self.cos_scale + self.cos_offset).cos();
        }
        if self.tan_scale != 0.0 {
            let limit = std::f64::consts::FRAC_PI_2 - 0.01;
            distorted += (normalized * self.tan_scale + self.tan_offset)
                .clamp(-limit, limit)
                .tan();
        }
        distorted * self.scale + self.offset
    }
}

impl AudioFilter for DistortionFilter {
    fn process(&mut self, samples: &mut Vec<i16>) {
        for sample in samples.iter_mut() {
            let shaped = self.shape(*sample as f64 / MAX_INT_16);
            *sample = clamp_i16(shaped.clamp(-1.0, 1.0) * MAX_INT_16);
        }
    }
}
