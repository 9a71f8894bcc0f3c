use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use tracing::{debug, error, warn};

use crate::{
    audio::filters::{EqualizerConfig, FilterChain},
    common::{GuildId, ProtocolError},
    player::{PlayRequest, Player},
    protocol::{IncomingMessage, Inbound, Track, ops},
    server::Session,
    voice::VoiceServerInfo,
};

/// Handles one inbound text frame. Failures are logged and never reach the transport.
pub fn dispatch(session: &Session, text: &str) {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        ops::decode(text).and_then(|inbound| handle(session, inbound))
    }));

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(ProtocolError::UnknownOp(op))) => {
            warn!("Ignoring unknown op '{}' from user {}", op, session.user_id);
        }
        Ok(Err(e)) => warn!("Failed to handle message from user {}: {}", session.user_id, e),
        Err(_) => error!("Panic while handling message from user {}", session.user_id),
    }
}

fn player(session: &Session, guild_id: &GuildId) -> Result<Arc<Player>, ProtocolError> {
    session.player(guild_id).ok_or(ProtocolError::SessionClosed)
}

fn handle(session: &Session, inbound: Inbound) -> Result<(), ProtocolError> {
    let Inbound { message, raw } = inbound;
    debug!("Received op '{}' from user {}", message.op(), session.user_id);

    let guild_id = message.guild_id()?;
    let Some(guild_id) = guild_id else {
        if let IncomingMessage::ConfigureResuming { key, timeout } = message {
            session.configure_resuming(key, timeout);
        }
        return Ok(());
    };

    match message {
        IncomingMessage::VoiceUpdate {
            session_id, event, ..
        } => {
            let Some(endpoint) = event.endpoint else {
                debug!("[{}] Voice update without endpoint, ignoring", guild_id);
                return Ok(());
            };
            player(session, &guild_id)?.connect_voice(VoiceServerInfo {
                session_id,
                endpoint,
                token: event.token,
            });
        }
        IncomingMessage::Play {
            track,
            start_time,
            end_time,
            volume,
            no_replace,
            pause,
            ..
        } => {
            let track = Track::decode(&track)?;
            player(session, &guild_id)?.play(PlayRequest {
                track,
                start_time,
                end_time,
                volume,
                no_replace,
                pause,
            });
        }
        IncomingMessage::Stop { .. } => player(session, &guild_id)?.stop(),
        IncomingMessage::Pause { pause, .. } => player(session, &guild_id)?.pause(pause),
        IncomingMessage::Seek { position, .. } => player(session, &guild_id)?.seek(position),
        IncomingMessage::Volume { volume, .. } => player(session, &guild_id)?.set_volume(volume),
        IncomingMessage::Equalizer { bands, .. } => {
            let player = player(session, &guild_id)?;
            let mut chain = player.filters();
            chain.equalizer = Some(EqualizerConfig(bands));
            player.set_filters(chain)?;
        }
        IncomingMessage::Filters { .. } => {
            let chain = FilterChain::from_value(&raw)?;
            player(session, &guild_id)?.set_filters(chain)?;
        }
        IncomingMessage::Destroy { .. } => session.destroy_player(&guild_id),
        IncomingMessage::ConfigureResuming { .. } => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use serde_json::Value;

    use super::*;
    use crate::{
        audio::{AudioDataFormat, filters::VolumeConfig},
        common::types::{ConnectionId, GuildId, UserId},
        configs::FiltersConfig,
        player::PlayerContext,
        protocol::TrackInfo,
        sources::SourceManager,
        voice::local::LocalVoiceClient,
    };

    fn session(filters: FiltersConfig) -> (Session, flume::Receiver<String>) {
        let (tx, rx) = flume::unbounded();
        let context = Arc::new(PlayerContext {
            sources: Arc::new(SourceManager::with_sources(Vec::new())),
            filters,
            update_interval: Duration::from_secs(5),
            format: AudioDataFormat::DISCORD_PCM,
        });
        let session = Session::new(
            ConnectionId::generate(),
            UserId(1),
            None,
            tx,
            Arc::new(LocalVoiceClient::new()),
            context,
            60,
        );
        (session, rx)
    }

    fn encoded_track() -> String {
        Track::new(TrackInfo {
            identifier: "nowhere".into(),
            title: "Missing".into(),
            author: "Nobody".into(),
            length: 1000,
            is_seekable: true,
            source_name: "nowhere".into(),
            ..Default::default()
        })
        .unwrap()
        .track
    }

    #[tokio::test]
    async fn unknown_and_malformed_messages_are_ignored() {
        let (session, rx) = session(FiltersConfig::default());
        dispatch(&session, r#"{"op":"lyrics","guildId":"1"}"#);
        dispatch(&session, "not json");
        dispatch(&session, r#"{"op":"stop","guildId":"abc"}"#);
        assert_eq!(session.player_count(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn filters_replace_the_chain() {
        let (session, _rx) = session(FiltersConfig::default());
        dispatch(
            &session,
            r#"{"op":"filters","guildId":"1","volume":0.5,"tremolo":{"frequency":5.0,"depth":0.5}}"#,
        );
        let filters = session.player(&GuildId::from("1")).unwrap().filters();
        assert_eq!(filters.volume, Some(VolumeConfig(0.5)));
        assert!(filters.tremolo.is_some());
        assert!(filters.karaoke.is_none());
    }

    #[tokio::test]
    async fn malformed_filters_keep_the_previous_chain() {
        let (session, _rx) = session(FiltersConfig::default());
        dispatch(&session, r#"{"op":"filters","guildId":"1","volume":0.5}"#);
        dispatch(&session, r#"{"op":"filters","guildId":"1","volume":"loud"}"#);
        dispatch(
            &session,
            r#"{"op":"filters","guildId":"1","equalizer":[{"band":20,"gain":0.1}]}"#,
        );
        let filters = session.player(&GuildId::from("1")).unwrap().filters();
        assert_eq!(filters.volume, Some(VolumeConfig(0.5)));
        assert!(filters.equalizer.is_none());
    }

    #[tokio::test]
    async fn disabled_filters_are_rejected() {
        let filters = FiltersConfig {
            tremolo: false,
            ..FiltersConfig::default()
        };
        let (session, _rx) = session(filters);
        dispatch(
            &session,
            r#"{"op":"filters","guildId":"1","tremolo":{"frequency":5.0}}"#,
        );
        assert!(session.player(&GuildId::from("1")).unwrap().filters().tremolo.is_none());
    }

    #[tokio::test]
    async fn equalizer_op_only_touches_the_equalizer() {
        let (session, _rx) = session(FiltersConfig::default());
        dispatch(&session, r#"{"op":"filters","guildId":"1","volume":0.8}"#);
        dispatch(
            &session,
            r#"{"op":"equalizer","guildId":"1","bands":[{"band":0,"gain":0.2}]}"#,
        );
        let filters = session.player(&GuildId::from("1")).unwrap().filters();
        assert_eq!(filters.volume, Some(VolumeConfig(0.8)));
        assert_eq!(filters.equalizer.map(|eq| eq.0.len()), Some(1));
    }

    #[tokio::test]
    async fn volume_op_is_last_write_wins_with_filters() {
        let (session, _rx) = session(FiltersConfig::default());
        dispatch(&session, r#"{"op":"filters","guildId":"1","volume":0.5}"#);
        dispatch(&session, r#"{"op":"volume","guildId":"1","volume":250}"#);
        let player = session.player(&GuildId::from("1")).unwrap();
        assert_eq!(player.volume(), 250);
        assert_eq!(player.filters().volume, Some(VolumeConfig(2.5)));
    }

    #[tokio::test]
    async fn destroy_removes_the_player() {
        let (session, _rx) = session(FiltersConfig::default());
        dispatch(&session, r#"{"op":"volume","guildId":"9","volume":40}"#);
        assert_eq!(session.player_count(), 1);
        dispatch(&session, r#"{"op":"destroy","guildId":"9"}"#);
        assert_eq!(session.player_count(), 0);
    }

    #[tokio::test]
    async fn configure_resuming_updates_the_session() {
        let (session, _rx) = session(FiltersConfig::default());
        dispatch(&session, r#"{"op":"configureResuming","key":"abc","timeout":5}"#);
        let settings = session.resume_settings();
        assert_eq!(settings.key.as_deref(), Some("abc"));
        assert_eq!(settings.timeout, 5);
    }

    #[tokio::test]
    async fn voice_update_without_endpoint_creates_no_connection() {
        let (session, _rx) = session(FiltersConfig::default());
        dispatch(
            &session,
            r#"{"op":"voiceUpdate","guildId":"1","sessionId":"s","event":{"token":"t"}}"#,
        );
        assert!(session.voice().is_empty());

        dispatch(
            &session,
            r#"{"op":"voiceUpdate","guildId":"1","sessionId":"s","event":{"token":"t","endpoint":"voice.example"}}"#,
        );
        assert!(session.voice().existing(&GuildId::from("1")).is_some());
        session.shutdown();
    }

    #[tokio::test]
    async fn play_of_unopenable_track_reports_load_failure() {
        let (session, rx) = session(FiltersConfig::default());
        let track = encoded_track();
        dispatch(
            &session,
            &format!(r#"{{"op":"play","guildId":"1","track":"{}"}}"#, track),
        );

        let mut types = Vec::new();
        while types.len() < 2 {
            let json = tokio::time::timeout(Duration::from_secs(1), rx.recv_async())
                .await
                .unwrap()
                .unwrap();
            let value: Value = serde_json::from_str(&json).unwrap();
            if value["op"] == "event" {
                types.push(value);
            }
        }
        assert_eq!(types[0]["type"], "TrackExceptionEvent");
        assert_eq!(types[1]["type"], "TrackEndEvent");
        assert_eq!(types[1]["reason"], "LOAD_FAILED");
        assert!(!session.player(&GuildId::from("1")).unwrap().has_track());
    }

    #[tokio::test]
    async fn bad_track_handle_is_ignored() {
        let (session, rx) = session(FiltersConfig::default());
        dispatch(&session, r#"{"op":"play","guildId":"1","track":"!!!"}"#);
        assert!(!session.player(&GuildId::from("1")).unwrap().has_track());
        assert!(rx.try_recv().is_err());
    }
}
