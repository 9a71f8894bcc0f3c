//! Symphonia decode path: any supported container to node-format PCM.

use std::path::Path;

use symphonia::core::{
    audio::SampleBuffer,
    codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions},
    errors::Error,
    formats::{FormatOptions, FormatReader, SeekMode, SeekTo},
    io::{MediaSource, MediaSourceStream},
    meta::{MetadataOptions, MetadataRevision, StandardTagKey},
    probe::Hint,
    units::Time,
};
use tracing::{debug, warn};

use super::{PcmReader, format::AudioDataFormat, resample::LinearResampler};
use crate::common::SourceError;

/// Metadata gathered while probing a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbedMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    /// Duration in milliseconds, when the container declares one.
    pub length: Option<u64>,
}

struct Opened {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    metadata: ProbedMetadata,
}

fn open(source: Box<dyn MediaSource>, extension: Option<&str>) -> Result<Opened, SourceError> {
    let mss = MediaSourceStream::new(source, Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let mut probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions {
            enable_gapless: true,
            ..Default::default()
        },
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SourceError::Other("no audio track found".into()))?;

    let params = track.codec_params.clone();
    let track_id = track.id;
    let sample_rate = params
        .sample_rate
        .ok_or_else(|| SourceError::Other("audio track has no sample rate".into()))?;
    let channels = params.channels.map(|c| c.count()).unwrap_or(2);

    let mut metadata = ProbedMetadata {
        length: params
            .n_frames
            .map(|frames| frames * 1000 / sample_rate as u64),
        ..Default::default()
    };
    if let Some(revision) = format.metadata().current() {
        read_tags(revision, &mut metadata);
    }
    if let Some(revision) = probed.metadata.get().as_ref().and_then(|m| m.current()) {
        read_tags(revision, &mut metadata);
    }

    let decoder = symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;

    Ok(Opened {
        format,
        decoder,
        track_id,
        sample_rate,
        channels,
        metadata,
    })
}

fn read_tags(revision: &MetadataRevision, metadata: &mut ProbedMetadata) {
    for tag in revision.tags() {
        match tag.std_key {
            Some(StandardTagKey::TrackTitle) if metadata.title.is_none() => {
                metadata.title = Some(tag.value.to_string());
            }
            Some(StandardTagKey::Artist | StandardTagKey::AlbumArtist)
                if metadata.author.is_none() =>
            {
                metadata.author = Some(tag.value.to_string());
            }
            _ => {}
        }
    }
}

/// Probes a resource for its metadata without decoding audio.
pub fn probe(
    source: Box<dyn MediaSource>,
    extension: Option<&str>,
) -> Result<ProbedMetadata, SourceError> {
    open(source, extension).map(|opened| opened.metadata)
}

pub fn extension_of(path: &str) -> Option<String> {
    Path::new(path.split(['?', '#']).next().unwrap_or(path))
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
}

/// Pull-based decoder producing interleaved i16 in the node format.
pub struct SymphoniaReader {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    source_channels: usize,
    target: AudioDataFormat,
    resampler: LinearResampler,
    sample_buf: Option<SampleBuffer<i16>>,
    /// Scratch space for channel mapping before resampling.
    mapped: Vec<i16>,
}

impl SymphoniaReader {
    pub fn new(
        source: Box<dyn MediaSource>,
        extension: Option<&str>,
        target: AudioDataFormat,
    ) -> Result<Self, SourceError> {
        let opened = open(source, extension)?;
        debug!(
            "Opened audio: {}Hz {}ch -> {}Hz {}ch",
            opened.sample_rate, opened.channels, target.sample_rate, target.channels
        );

        Ok(Self {
            format: opened.format,
            decoder: opened.decoder,
            track_id: opened.track_id,
            source_channels: opened.channels.max(1),
            resampler: LinearResampler::new(opened.sample_rate, target.sample_rate, target.channels),
            target,
            sample_buf: None,
            mapped: Vec::new(),
        })
    }

    /// Maps source channels onto the target layout: mono is duplicated, extras are dropped.
    fn map_channels(&mut self, samples: &[i16]) {
        self.mapped.clear();
        for frame in samples.chunks_exact(self.source_channels) {
            for c in 0..self.target.channels {
                self.mapped.push(frame[c.min(self.source_channels - 1)]);
            }
        }
    }
}

impl PcmReader for SymphoniaReader {
    fn read(&mut self, out: &mut Vec<i16>) -> Result<bool, SourceError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(Error::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let mut buf = match self.sample_buf.take() {
                        Some(buf) if buf.capacity() >= decoded.capacity() * spec.channels.count() => buf,
                        _ => SampleBuffer::<i16>::new(decoded.capacity() as u64, spec),
                    };
                    buf.copy_interleaved_ref(decoded);

                    let samples = buf.samples().to_vec();
                    self.sample_buf = Some(buf);
                    if samples.is_empty() {
                        continue;
                    }

                    self.map_channels(&samples);
                    self.resampler.process(&self.mapped, out);
                    return Ok(true);
                }
                Err(Error::DecodeError(e)) => {
                    warn!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn seek(&mut self, position_ms: u64) -> Result<u64, SourceError> {
        let seeked = self.format.seek(
            SeekMode::Coarse,
            SeekTo::Time {
                time: Time::from(position_ms as f64 / 1000.0),
                track_id: Some(self.track_id),
            },
        )?;
        self.decoder.reset();
        self.resampler.reset();

        let rate = self
            .format
            .tracks()
            .iter()
            .find(|t| t.id == self.track_id)
            .and_then(|t| t.codec_params.time_base)
            .map(|tb| {
                let time = tb.calc_time(seeked.actual_ts);
                time.seconds * 1000 + (time.frac * 1000.0) as u64
            });
        Ok(rate.unwrap_or(position_ms))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::audio::test_support::wav;

    #[test]
    fn probes_wav_length() {
        let bytes = wav(48_000, 2, 48_000);
        let meta = probe(Box::new(Cursor::new(bytes)), Some("wav")).unwrap();
        assert_eq!(meta.length, Some(1000));
    }

    #[test]
    fn mono_input_is_widened_to_stereo() {
        let bytes = wav(48_000, 1, 4_800);
        let mut reader = SymphoniaReader::new(
            Box::new(Cursor::new(bytes)),
            Some("wav"),
            AudioDataFormat::DISCORD_PCM,
        )
        .unwrap();

        let mut out = Vec::new();
        while reader.read(&mut out).unwrap() {}
        assert_eq!(out.len(), 4_800 * 2);
        assert!(out.chunks_exact(2).all(|f| f[0] == f[1]));
    }

    #[test]
    fn garbage_is_rejected() {
        let result = SymphoniaReader::new(
            Box::new(Cursor::new(vec![0u8; 64])),
            None,
            AudioDataFormat::DISCORD_PCM,
        );
        assert!(result.is_err());
    }

    #[test]
    fn extensions_ignore_query_strings() {
        assert_eq!(extension_of("https://cdn.example/a/Song.MP3?x=1"), Some("mp3".into()));
        assert_eq!(extension_of("/music/track"), None);
    }
}
