//! Linear-interpolation resampler used to bring decoded audio to the node rate.

pub struct LinearResampler {
    /// Source / target ratio (< 1.0 upsamples, > 1.0 downsamples).
    ratio: f64,
    /// Fractional read head within the current input block.
    index: f64,
    /// Last frame of the previous block, for cross-block interpolation.
    last_frame: Vec<i16>,
    channels: usize,
}

impl LinearResampler {
    pub fn new(source_rate: u32, target_rate: u32, channels: usize) -> Self {
        Self {
            ratio: source_rate as f64 / target_rate as f64,
            index: 0.0,
            last_frame: vec![0; channels],
            channels,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        (self.ratio - 1.0).abs() < f64::EPSILON
    }

    /// Resamples `input` and appends the result to `output`.
    pub fn process(&mut self, input: &[i16], output: &mut Vec<i16>) {
        if self.is_passthrough() {
            output.extend_from_slice(input);
            return;
        }

        let frames = input.len() / self.channels;
        if frames == 0 {
            return;
        }

        while self.index < frames as f64 {
            let idx = self.index as usize;
            let fract = self.index.fract();

            for c in 0..self.channels {
                let s1 = if idx == 0 {
                    self.last_frame[c] as f64
                } else {
                    input[(idx - 1) * self.channels + c] as f64
                };
                let s2 = input[idx * self.channels + c] as f64;
                output.push((s1 * (1.0 - fract) + s2 * fract) as i16);
            }

            self.index += self.ratio;
        }

        self.index -= frames as f64;
        self.last_frame
            .copy_from_slice(&input[(frames - 1) * self.channels..frames * self.channels]);
    }

    pub fn reset(&mut self) {
        self.index = 0.0;
        self.last_frame.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsampling_produces_proportional_output() {
        let mut resampler = LinearResampler::new(44_100, 48_000, 2);
        let input = vec![1000i16; 441 * 2];
        let mut output = Vec::new();
        resampler.process(&input, &mut output);

        let frames = output.len() / 2;
        assert!((479..=481).contains(&frames), "got {} frames", frames);
    }

    #[test]
    fn same_rate_is_passthrough() {
        let mut resampler = LinearResampler::new(48_000, 48_000, 2);
        let mut output = Vec::new();
        resampler.process(&[1, 2, 3, 4], &mut output);
        assert_eq!(output, vec![1, 2, 3, 4]);
    }
}
