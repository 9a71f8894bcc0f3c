pub mod decoder;
pub mod filters;
pub mod format;
pub mod resample;

pub use decoder::{ProbedMetadata, SymphoniaReader};
pub use format::AudioDataFormat;

use crate::common::SourceError;

/// A pull source of decoded PCM in the node format (48 kHz stereo i16).
pub trait PcmReader: Send {
    /// Appends the next block of interleaved samples to `out`.
    ///
    /// Returns `Ok(false)` once the stream is exhausted.
    fn read(&mut self, out: &mut Vec<i16>) -> Result<bool, SourceError>;

    /// Seeks to `position_ms` and returns the position actually reached.
    fn seek(&mut self, position_ms: u64) -> Result<u64, SourceError>;
}

#[cfg(test)]
pub(crate) mod test_support {
    /// Builds a 16-bit PCM WAV file in memory.
    pub fn wav(sample_rate: u32, channels: u16, frames: usize) -> Vec<u8> {
        let data_len = frames * channels as usize * 2;
        let mut out = Vec::with_capacity(44 + data_len);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&((36 + data_len) as u32).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * channels as u32 * 2).to_le_bytes());
        out.extend_from_slice(&(channels * 2).to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&(data_len as u32).to_le_bytes());
        for i in 0..frames * channels as usize {
            out.extend_from_slice(&(((i % 200) as i16 - 100) * 50).to_le_bytes());
        }
        out
    }

    /// A reader over a fixed sample buffer, handed out in 20 ms blocks.
    pub struct VecReader {
        pub samples: Vec<i16>,
        pub cursor: usize,
    }

    impl VecReader {
        /// `ms` of constant-valued stereo audio at 48 kHz.
        pub fn constant(value: i16, ms: u64) -> Self {
            Self {
                samples: vec![value; (ms * 96) as usize],
                cursor: 0,
            }
        }
    }

    impl super::PcmReader for VecReader {
        fn read(&mut self, out: &mut Vec<i16>) -> Result<bool, crate::common::SourceError> {
            if self.cursor >= self.samples.len() {
                return Ok(false);
            }
            let end = (self.cursor + 1920).min(self.samples.len());
            out.extend_from_slice(&self.samples[self.cursor..end]);
            self.cursor = end;
            Ok(true)
        }

        fn seek(&mut self, position_ms: u64) -> Result<u64, crate::common::SourceError> {
            self.cursor = ((position_ms * 96) as usize).min(self.samples.len());
            Ok(position_ms)
        }
    }
}
