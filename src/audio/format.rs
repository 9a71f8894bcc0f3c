/// Layout of the interleaved i16 PCM flowing through players and filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioDataFormat {
    pub channels: usize,
    pub sample_rate: u32,
}

impl AudioDataFormat {
    /// What the voice transport consumes: 48 kHz stereo in 20 ms frames.
    pub const DISCORD_PCM: Self = Self::new(2, 48_000);
    pub const FRAME_DURATION_MS: u64 = 20;

    pub const fn new(channels: usize, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }

    /// Interleaved samples in one 20 ms frame.
    pub fn frame_samples(&self) -> usize {
        self.sample_rate as usize * Self::FRAME_DURATION_MS as usize / 1000 * self.channels
    }

    pub fn samples_to_ms(&self, samples: u64) -> u64 {
        samples * 1000 / (self.sample_rate as u64 * self.channels as u64)
    }

    pub fn ms_to_samples(&self, ms: u64) -> u64 {
        ms * self.sample_rate as u64 / 1000 * self.channels as u64
    }
}
