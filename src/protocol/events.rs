use serde::Serialize;

use crate::{
    common::{FriendlyException, GuildId, Severity},
    protocol::stats::Stats,
};

/// Messages sent from server to client over the websocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum OutgoingMessage {
    PlayerUpdate {
        #[serde(rename = "guildId")]
        guild_id: GuildId,
        state: PlayerState,
    },
    Stats {
        #[serde(flatten)]
        stats: Stats,
    },
    Event {
        #[serde(flatten)]
        event: PlayerEvent,
    },
}

impl OutgoingMessage {
    pub fn to_json(&self) -> String {
        // Only plain data types reach here, serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Snapshot pushed with every `playerUpdate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlayerState {
    /// Unix timestamp in milliseconds.
    pub time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,
    pub connected: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    #[serde(rename = "TrackStartEvent")]
    TrackStart {
        #[serde(rename = "guildId")]
        guild_id: GuildId,
        track: String,
    },

    #[serde(rename = "TrackEndEvent")]
    TrackEnd {
        #[serde(rename = "guildId")]
        guild_id: GuildId,
        track: String,
        reason: TrackEndReason,
    },

    #[serde(rename = "TrackExceptionEvent")]
    TrackException {
        #[serde(rename = "guildId")]
        guild_id: GuildId,
        track: String,
        exception: TrackException,
    },

    #[serde(rename = "WebSocketClosedEvent")]
    WebSocketClosed {
        #[serde(rename = "guildId")]
        guild_id: GuildId,
        code: u16,
        reason: String,
        #[serde(rename = "byRemote")]
        by_remote: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

impl TrackEndReason {
    /// Whether a client may start the next queued track after this end.
    pub fn may_start_next(self) -> bool {
        matches!(self, Self::Finished | Self::LoadFailed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackException {
    pub message: String,
    pub severity: Severity,
    pub cause: String,
}

impl From<FriendlyException> for TrackException {
    fn from(e: FriendlyException) -> Self {
        Self {
            cause: e.message.clone(),
            message: e.message,
            severity: e.severity,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn player_update_omits_position_without_track() {
        let msg = OutgoingMessage::PlayerUpdate {
            guild_id: "42".into(),
            state: PlayerState {
                time: 1,
                position: None,
                connected: false,
            },
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"op": "playerUpdate", "guildId": "42", "state": {"time": 1, "connected": false}})
        );
    }

    #[test]
    fn events_are_flattened_under_event_op() {
        let msg = OutgoingMessage::Event {
            event: PlayerEvent::WebSocketClosed {
                guild_id: "7".into(),
                code: 4006,
                reason: "Session is no longer valid.".into(),
                by_remote: true,
            },
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "op": "event",
                "type": "WebSocketClosedEvent",
                "guildId": "7",
                "code": 4006,
                "reason": "Session is no longer valid.",
                "byRemote": true
            })
        );

        let end = OutgoingMessage::Event {
            event: PlayerEvent::TrackEnd {
                guild_id: "7".into(),
                track: "QAAA".into(),
                reason: TrackEndReason::LoadFailed,
            },
        };
        assert_eq!(serde_json::to_value(&end).unwrap()["reason"], "LOAD_FAILED");
    }
}
