use std::io::{Cursor, Read, Write};

use base64::prelude::*;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::common::{FriendlyException, TrackCodecError};

/// Newest track message version this node writes.
pub const TRACK_MESSAGE_VERSION: u8 = 3;
/// Header flag: a version byte follows the header.
const TRACK_INFO_VERSIONED: u32 = 1;
const MAX_PAYLOAD_SIZE: usize = (1 << 30) - 1;
/// Length reported for live streams.
pub const STREAM_LENGTH: u64 = i64::MAX as u64;

/// Metadata for an audio track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub identifier: String,
    pub is_seekable: bool,
    pub author: String,
    /// Duration in milliseconds. Live streams report [`STREAM_LENGTH`].
    pub length: u64,
    pub is_stream: bool,
    /// Playback position in milliseconds.
    pub position: u64,
    pub title: String,
    pub uri: Option<String>,
    #[serde(default)]
    pub artwork_url: Option<String>,
    #[serde(default)]
    pub isrc: Option<String>,
    pub source_name: String,
}

/// An encoded track handle together with its decoded info, as sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Base64-encoded track message.
    pub track: String,
    pub info: TrackInfo,
}

impl Track {
    pub fn new(info: TrackInfo) -> Result<Self, TrackCodecError> {
        Ok(Self {
            track: encode_track(&info)?,
            info,
        })
    }

    pub fn decode(encoded: &str) -> Result<Self, TrackCodecError> {
        Ok(Self {
            track: encoded.to_string(),
            info: decode_track(encoded)?,
        })
    }
}

/// Encodes track info into the versioned binary track message, base64 wrapped.
///
/// Layout (version 3):
///   [u32 header: payload size | flags << 30]
///   [u8  version]
///   [utf title] [utf author] [u64 length] [utf identifier] [u8 is_stream]
///   [opt utf uri] [opt utf artwork_url] [opt utf isrc]
///   [utf source_name] [u64 position]
pub fn encode_track(info: &TrackInfo) -> Result<String, TrackCodecError> {
    let mut body = Vec::new();
    body.write_u8(TRACK_MESSAGE_VERSION)?;
    write_utf(&mut body, &info.title)?;
    write_utf(&mut body, &info.author)?;
    body.write_u64::<BigEndian>(info.length)?;
    write_utf(&mut body, &info.identifier)?;
    body.write_u8(info.is_stream as u8)?;
    write_opt_utf(&mut body, info.uri.as_deref())?;
    write_opt_utf(&mut body, info.artwork_url.as_deref())?;
    write_opt_utf(&mut body, info.isrc.as_deref())?;
    write_utf(&mut body, &info.source_name)?;
    body.write_u64::<BigEndian>(info.position)?;

    if body.len() > MAX_PAYLOAD_SIZE {
        return Err(TrackCodecError::FieldTooLong(body.len()));
    }

    let mut message = Vec::with_capacity(body.len() + 4);
    message.write_u32::<BigEndian>(body.len() as u32 | (TRACK_INFO_VERSIONED << 30))?;
    message.extend_from_slice(&body);

    Ok(BASE64_STANDARD.encode(&message))
}

/// Decodes a base64 track message of version 1, 2 or 3.
pub fn decode_track(encoded: &str) -> Result<TrackInfo, TrackCodecError> {
    let data = BASE64_STANDARD.decode(encoded.trim())?;
    let mut cursor = Cursor::new(data.as_slice());

    let header = cursor.read_u32::<BigEndian>()?;
    let flags = header >> 30;
    let size = (header & MAX_PAYLOAD_SIZE as u32) as usize;
    if data.len() - 4 < size {
        return Err(TrackCodecError::Truncated);
    }

    let version = if flags & TRACK_INFO_VERSIONED != 0 {
        cursor.read_u8()?
    } else {
        1
    };
    if !(1..=TRACK_MESSAGE_VERSION).contains(&version) {
        return Err(TrackCodecError::UnsupportedVersion(version));
    }

    let title = read_utf(&mut cursor)?;
    let author = read_utf(&mut cursor)?;
    let length = cursor.read_u64::<BigEndian>()?;
    let identifier = read_utf(&mut cursor)?;
    let is_stream = cursor.read_u8()? != 0;
    let uri = if version >= 2 {
        read_opt_utf(&mut cursor)?
    } else {
        None
    };
    let (artwork_url, isrc) = if version >= 3 {
        (read_opt_utf(&mut cursor)?, read_opt_utf(&mut cursor)?)
    } else {
        (None, None)
    };
    let source_name = read_utf(&mut cursor)?;
    let position = cursor.read_u64::<BigEndian>()?;

    Ok(TrackInfo {
        identifier,
        is_seekable: !is_stream,
        author,
        length,
        is_stream,
        position,
        title,
        uri,
        artwork_url,
        isrc,
        source_name,
    })
}

fn write_utf<W: Write>(w: &mut W, s: &str) -> Result<(), TrackCodecError> {
    let bytes = s.as_bytes();
    let len = u16::try_from(bytes.len()).map_err(|_| TrackCodecError::FieldTooLong(bytes.len()))?;
    w.write_u16::<BigEndian>(len)?;
    w.write_all(bytes)?;
    Ok(())
}

fn write_opt_utf<W: Write>(w: &mut W, s: Option<&str>) -> Result<(), TrackCodecError> {
    match s {
        Some(s) => {
            w.write_u8(1)?;
            write_utf(w, s)
        }
        None => Ok(w.write_u8(0)?),
    }
}

fn read_utf<R: Read>(r: &mut R) -> Result<String, TrackCodecError> {
    let len = r.read_u16::<BigEndian>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| TrackCodecError::InvalidUtf8)
}

fn read_opt_utf<R: Read>(r: &mut R) -> Result<Option<String>, TrackCodecError> {
    if r.read_u8()? != 0 {
        read_utf(r).map(Some)
    } else {
        Ok(None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadType {
    TrackLoaded,
    PlaylistLoaded,
    SearchResult,
    NoMatches,
    LoadFailed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_track: Option<i32>,
}

/// Outcome of resolving an identifier, shaped for `/loadtracks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadResult {
    pub load_type: LoadType,
    pub playlist_info: PlaylistInfo,
    pub tracks: Vec<Track>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<FriendlyException>,
}

impl LoadResult {
    pub fn track(track: Track) -> Self {
        Self::with_tracks(LoadType::TrackLoaded, vec![track])
    }

    pub fn search(tracks: Vec<Track>) -> Self {
        Self::with_tracks(LoadType::SearchResult, tracks)
    }

    pub fn playlist(name: impl Into<String>, selected_track: i32, tracks: Vec<Track>) -> Self {
        Self {
            load_type: LoadType::PlaylistLoaded,
            playlist_info: PlaylistInfo {
                name: Some(name.into()),
                selected_track: Some(selected_track),
            },
            tracks,
            exception: None,
        }
    }

    pub fn no_matches() -> Self {
        Self::with_tracks(LoadType::NoMatches, Vec::new())
    }

    pub fn failed(exception: FriendlyException) -> Self {
        Self {
            exception: Some(exception),
            ..Self::with_tracks(LoadType::LoadFailed, Vec::new())
        }
    }

    fn with_tracks(load_type: LoadType, tracks: Vec<Track>) -> Self {
        Self {
            load_type,
            playlist_info: PlaylistInfo::default(),
            tracks,
            exception: None,
        }
    }
}
