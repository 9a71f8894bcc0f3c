use serde::Deserialize;
use serde_json::Value;

use crate::{
    audio::filters::EqBand,
    common::{GuildId, ProtocolError},
};

/// Every op this node understands. Anything else is logged and ignored.
pub const KNOWN_OPS: [&str; 10] = [
    "voiceUpdate",
    "play",
    "stop",
    "pause",
    "seek",
    "volume",
    "equalizer",
    "filters",
    "destroy",
    "configureResuming",
];

/// Messages sent from client to server over the websocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum IncomingMessage {
    VoiceUpdate {
        guild_id: String,
        session_id: String,
        event: VoiceServerEvent,
    },
    Play {
        guild_id: String,
        track: String,
        start_time: Option<u64>,
        end_time: Option<u64>,
        /// Deprecated, use the `volume` filter.
        volume: Option<i32>,
        #[serde(default)]
        no_replace: bool,
        #[serde(default)]
        pause: bool,
    },
    Stop {
        guild_id: String,
    },
    Pause {
        guild_id: String,
        pause: bool,
    },
    Seek {
        guild_id: String,
        position: u64,
    },
    Volume {
        guild_id: String,
        volume: i32,
    },
    /// Deprecated, use `filters`.
    Equalizer {
        guild_id: String,
        bands: Vec<EqBand>,
    },
    /// The filter payload is read from the raw message, see [`Inbound::raw`].
    Filters {
        guild_id: String,
    },
    Destroy {
        guild_id: String,
    },
    ConfigureResuming {
        key: Option<String>,
        timeout: Option<u64>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceServerEvent {
    pub token: String,
    pub endpoint: Option<String>,
}

/// A decoded message together with the JSON it came from.
#[derive(Debug)]
pub struct Inbound {
    pub message: IncomingMessage,
    pub raw: Value,
}

impl IncomingMessage {
    pub fn op(&self) -> &'static str {
        match self {
            Self::VoiceUpdate { .. } => "voiceUpdate",
            Self::Play { .. } => "play",
            Self::Stop { .. } => "stop",
            Self::Pause { .. } => "pause",
            Self::Seek { .. } => "seek",
            Self::Volume { .. } => "volume",
            Self::Equalizer { .. } => "equalizer",
            Self::Filters { .. } => "filters",
            Self::Destroy { .. } => "destroy",
            Self::ConfigureResuming { .. } => "configureResuming",
        }
    }

    /// The addressed room, if the op targets one.
    pub fn guild_id(&self) -> Result<Option<GuildId>, ProtocolError> {
        let raw = match self {
            Self::VoiceUpdate { guild_id, .. }
            | Self::Play { guild_id, .. }
            | Self::Stop { guild_id }
            | Self::Pause { guild_id, .. }
            | Self::Seek { guild_id, .. }
            | Self::Volume { guild_id, .. }
            | Self::Equalizer { guild_id, .. }
            | Self::Filters { guild_id }
            | Self::Destroy { guild_id } => guild_id,
            Self::ConfigureResuming { .. } => return Ok(None),
        };
        GuildId::parse(raw)
            .map(Some)
            .ok_or_else(|| ProtocolError::InvalidGuild(raw.clone()))
    }
}

/// Decodes one text frame. Unknown ops are reported separately from malformed bodies.
pub fn decode(text: &str) -> Result<Inbound, ProtocolError> {
    let raw: Value = serde_json::from_str(text)?;
    let op = raw
        .get("op")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingOp)?;
    if !KNOWN_OPS.contains(&op) {
        return Err(ProtocolError::UnknownOp(op.to_string()));
    }

    let message = IncomingMessage::deserialize(&raw)?;
    Ok(Inbound { message, raw })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_with_optional_fields() {
        let inbound = decode(
            r#"{"op":"play","guildId":"123","track":"QAAA","startTime":500,"noReplace":true}"#,
        )
        .unwrap();
        match inbound.message {
            IncomingMessage::Play {
                start_time,
                end_time,
                no_replace,
                pause,
                ..
            } => {
                assert_eq!(start_time, Some(500));
                assert_eq!(end_time, None);
                assert!(no_replace);
                assert!(!pause);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn unknown_and_missing_ops_are_distinguished() {
        assert!(matches!(
            decode(r#"{"op":"lyrics","guildId":"1"}"#),
            Err(ProtocolError::UnknownOp(op)) if op == "lyrics"
        ));
        assert!(matches!(decode(r#"{"guildId":"1"}"#), Err(ProtocolError::MissingOp)));
        assert!(matches!(decode("{nope"), Err(ProtocolError::Malformed(_))));
        assert!(matches!(
            decode(r#"{"op":"seek","guildId":"1"}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn guild_ids_are_validated() {
        let inbound = decode(r#"{"op":"stop","guildId":"abc"}"#).unwrap();
        assert!(matches!(
            inbound.message.guild_id(),
            Err(ProtocolError::InvalidGuild(_))
        ));

        let inbound = decode(r#"{"op":"configureResuming","key":"abc","timeout":5}"#).unwrap();
        assert!(inbound.message.guild_id().unwrap().is_none());
        assert_eq!(inbound.message.op(), "configureResuming");
    }

    #[test]
    fn voice_update_without_endpoint_decodes() {
        let inbound = decode(
            r#"{"op":"voiceUpdate","guildId":"1","sessionId":"s","event":{"token":"t","endpoint":null}}"#,
        )
        .unwrap();
        assert!(matches!(
            inbound.message,
            IncomingMessage::VoiceUpdate { event: VoiceServerEvent { endpoint: None, .. }, .. }
        ));
    }
}
