pub mod loss;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use loss::{AudioLossCounter, EXPECTED_FRAMES_PER_MINUTE};

use crate::{
    audio::{
        AudioDataFormat,
        filters::{FilterChain, FilterPipeline, VolumeConfig, validate_filters},
    },
    common::{FilterError, GuildId, SourceError, now_ms},
    configs::FiltersConfig,
    protocol::{
        OutgoingMessage, PlayerEvent, PlayerState, Track, TrackEndReason, TrackException,
        TrackInfo,
    },
    server::outbox::{Outbox, SessionState},
    sources::{SourceManager, plugin::BoxedReader},
    voice::{FrameProvider, VoiceConnectionManager, VoiceServerInfo},
};

/// Node-wide dependencies shared by every player.
pub struct PlayerContext {
    pub sources: Arc<SourceManager>,
    pub filters: FiltersConfig,
    pub update_interval: Duration,
    pub format: AudioDataFormat,
}

/// Arguments of a `play` op, with the track already decoded.
#[derive(Debug, Clone)]
pub struct PlayRequest {
    pub track: Track,
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
    pub volume: Option<i32>,
    pub no_replace: bool,
    /// Applied on every play, so an omitted flag resumes a paused player.
    pub pause: bool,
}

impl PlayRequest {
    pub fn new(track: Track) -> Self {
        Self {
            track,
            start_time: None,
            end_time: None,
            volume: None,
            no_replace: false,
            pause: false,
        }
    }
}

struct ActiveTrack {
    encoded: String,
    info: TrackInfo,
    /// Set once the source has opened.
    opened: bool,
    /// `None` while opening, or while the pacer has it checked out for a read.
    reader: Option<BoxedReader>,
    /// Seek requested while the reader was checked out.
    pending_seek: Option<u64>,
    /// Where playback starts once the reader is open.
    start_ms: u64,
    end_marker: Option<u64>,
    base_ms: u64,
    /// Source samples pulled since `base_ms`.
    consumed: u64,
}

impl ActiveTrack {
    fn position_ms(&self, format: &AudioDataFormat) -> u64 {
        if !self.opened {
            return self.start_ms;
        }
        if let Some(position) = self.pending_seek {
            return position;
        }
        self.base_ms + format.samples_to_ms(self.consumed)
    }

    fn apply_seek(
        &mut self,
        reader: &mut BoxedReader,
        position: u64,
        guild_id: &GuildId,
    ) -> bool {
        match reader.seek(position) {
            Ok(actual) => {
                self.base_ms = actual;
                self.consumed = 0;
                true
            }
            Err(e) => {
                warn!("[{}] Seek to {}ms failed: {}", guild_id, position, e);
                false
            }
        }
    }
}

struct PlayerAudio {
    current: Option<ActiveTrack>,
    pipeline: FilterPipeline,
    /// Processed samples not yet handed out as a frame.
    output: Vec<i16>,
}

enum Ending {
    Finished,
    Marker,
    Failed(SourceError),
}

/// One guild's playback state machine.
pub struct Player {
    pub guild_id: GuildId,
    context: Arc<PlayerContext>,
    outbox: Arc<Outbox>,
    voice: Arc<VoiceConnectionManager>,
    audio: Mutex<PlayerAudio>,
    filters: Mutex<FilterChain>,
    paused: AtomicBool,
    volume: AtomicI32,
    /// Bumped under the audio lock whenever the assigned track changes.
    generation: AtomicU64,
    update_task: Mutex<Option<CancellationToken>>,
    loss: Mutex<AudioLossCounter>,
}

impl Player {
    pub fn new(
        guild_id: GuildId,
        context: Arc<PlayerContext>,
        outbox: Arc<Outbox>,
        voice: Arc<VoiceConnectionManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            guild_id,
            context,
            outbox,
            voice,
            audio: Mutex::new(PlayerAudio {
                current: None,
                pipeline: FilterPipeline::empty(),
                output: Vec::new(),
            }),
            filters: Mutex::new(FilterChain::default()),
            paused: AtomicBool::new(false),
            volume: AtomicI32::new(100),
            generation: AtomicU64::new(0),
            update_task: Mutex::new(None),
            loss: Mutex::new(AudioLossCounter::new()),
        })
    }

    fn emit(&self, event: PlayerEvent) {
        self.outbox.send_message(&OutgoingMessage::Event { event });
    }

    fn emit_end(&self, track: String, reason: TrackEndReason) {
        debug!("[{}] Track ended: {:?}", self.guild_id, reason);
        self.emit(PlayerEvent::TrackEnd {
            guild_id: self.guild_id.clone(),
            track,
            reason,
        });
    }

    /// Starts `request.track`. Returns false when `noReplace` kept the current track.
    pub fn play(self: &Arc<Self>, request: PlayRequest) -> bool {
        let PlayRequest {
            track,
            start_time,
            end_time,
            volume,
            no_replace,
            pause,
        } = request;

        let (generation, replaced) = {
            let mut audio = self.audio.lock();
            if no_replace && audio.current.is_some() {
                debug!("[{}] Skipping play, a track is already assigned", self.guild_id);
                return false;
            }

            let replaced = audio.current.take().map(|t| t.encoded);
            audio.output.clear();
            audio.pipeline.reset();
            audio.current = Some(ActiveTrack {
                encoded: track.track.clone(),
                info: track.info.clone(),
                opened: false,
                reader: None,
                pending_seek: None,
                start_ms: start_time.unwrap_or(0),
                end_marker: end_time.filter(|end| *end > 0),
                base_ms: 0,
                consumed: 0,
            });
            (self.generation.fetch_add(1, Ordering::AcqRel) + 1, replaced)
        };

        if let Some(old) = replaced {
            self.emit_end(old, TrackEndReason::Replaced);
        }
        self.paused.store(pause, Ordering::Release);
        if let Some(volume) = volume {
            self.set_volume(volume);
        }

        info!("[{}] Playing '{}'", self.guild_id, track.info.title);
        self.attach_provider();
        self.ensure_updates();
        self.spawn_open(generation, track.info);
        true
    }

    fn spawn_open(self: &Arc<Self>, generation: u64, info: TrackInfo) {
        let player = self.clone();
        tokio::spawn(async move {
            let result = player
                .context
                .sources
                .open(&info, player.context.format)
                .await;
            player.on_opened(generation, result);
        });
    }

    fn on_opened(&self, generation: u64, result: Result<BoxedReader, SourceError>) {
        let outcome = {
            let mut audio = self.audio.lock();
            if self.generation.load(Ordering::Acquire) != generation {
                debug!("[{}] Dropping superseded track", self.guild_id);
                return;
            }
            let Some(track) = audio.current.as_mut() else {
                return;
            };

            match result {
                Ok(mut reader) => {
                    if track.start_ms > 0 {
                        match reader.seek(track.start_ms) {
                            Ok(actual) => track.base_ms = actual,
                            Err(e) => warn!("[{}] Could not seek to start: {}", self.guild_id, e),
                        }
                    }
                    track.opened = true;
                    track.reader = Some(reader);
                    Ok(track.encoded.clone())
                }
                Err(e) => {
                    let encoded = track.encoded.clone();
                    audio.current = None;
                    self.generation.fetch_add(1, Ordering::AcqRel);
                    Err((encoded, e))
                }
            }
        };

        match outcome {
            Ok(encoded) => {
                self.loss.lock().on_playing(now_ms());
                self.emit(PlayerEvent::TrackStart {
                    guild_id: self.guild_id.clone(),
                    track: encoded,
                });
            }
            Err((encoded, e)) => {
                warn!("[{}] Failed to open track: {}", self.guild_id, e);
                self.stop_updates();
                self.emit(PlayerEvent::TrackException {
                    guild_id: self.guild_id.clone(),
                    track: encoded.clone(),
                    exception: TrackException::from(e.to_friendly()),
                });
                self.emit_end(encoded, TrackEndReason::LoadFailed);
            }
        }
    }

    /// Clears the current track and end marker. Idempotent.
    pub fn stop(&self) {
        if let Some(encoded) = self.clear_track() {
            self.emit_end(encoded, TrackEndReason::Stopped);
        }
    }

    /// Stops with `CLEANUP` and releases the guild's voice connection.
    pub fn destroy(&self) {
        if let Some(encoded) = self.clear_track() {
            self.emit_end(encoded, TrackEndReason::Cleanup);
        }
        self.voice.release(&self.guild_id);
    }

    fn clear_track(&self) -> Option<String> {
        self.stop_updates();
        self.loss.lock().on_stopped();
        let mut audio = self.audio.lock();
        let track = audio.current.take()?;
        audio.output.clear();
        audio.pipeline.reset();
        self.generation.fetch_add(1, Ordering::AcqRel);
        Some(track.encoded)
    }

    pub fn seek(&self, position: u64) {
        {
            let mut audio = self.audio.lock();
            let PlayerAudio {
                current,
                pipeline,
                output,
            } = &mut *audio;
            let Some(track) = current.as_mut() else {
                return;
            };

            if !track.opened {
                track.start_ms = position;
            } else if let Some(mut reader) = track.reader.take() {
                let moved = track.apply_seek(&mut reader, position, &self.guild_id);
                track.reader = Some(reader);
                if !moved {
                    return;
                }
                output.clear();
                pipeline.reset();
            } else {
                // Applied by the pacer when it hands the reader back.
                track.pending_seek = Some(position);
            }
        }
        self.send_update();
    }

    pub fn pause(&self, pause: bool) {
        self.paused.store(pause, Ordering::Release);
        self.send_update();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Sets the legacy 0-1000 volume, applied as the volume filter's gain.
    pub fn set_volume(&self, volume: i32) {
        let volume = volume.clamp(0, 1000);
        self.volume.store(volume, Ordering::Release);

        let chain = {
            let mut filters = self.filters.lock();
            filters.volume = Some(VolumeConfig(volume as f32 / 100.0));
            filters.clone()
        };
        self.install_pipeline(&chain);
    }

    pub fn volume(&self) -> i32 {
        self.volume.load(Ordering::Acquire)
    }

    /// Replaces the whole filter configuration. On error the previous one stays.
    pub fn set_filters(&self, chain: FilterChain) -> Result<(), FilterError> {
        chain.validate_bands()?;
        validate_filters(&chain, &self.context.filters)?;
        self.install_pipeline(&chain);
        *self.filters.lock() = chain;
        Ok(())
    }

    pub fn filters(&self) -> FilterChain {
        self.filters.lock().clone()
    }

    fn install_pipeline(&self, chain: &FilterChain) {
        let pipeline = FilterPipeline::build(
            chain,
            &self.context.format,
            self.context.filters.timescale_available,
        );
        debug!("[{}] Filter pipeline: {:?}", self.guild_id, pipeline.kinds());
        self.audio.lock().pipeline = pipeline;
    }

    pub fn connect_voice(self: &Arc<Self>, info: VoiceServerInfo) {
        self.voice.connection(&self.guild_id).connect(info);
        self.attach_provider();
    }

    fn attach_provider(self: &Arc<Self>) {
        let provider: Arc<dyn FrameProvider> = self.clone();
        self.voice
            .connection(&self.guild_id)
            .set_provider(Some(provider));
    }

    pub fn track(&self) -> Option<TrackInfo> {
        self.audio.lock().current.as_ref().map(|t| t.info.clone())
    }

    pub fn has_track(&self) -> bool {
        self.audio.lock().current.is_some()
    }

    /// Playing means a track is open and not paused.
    pub fn is_playing(&self) -> bool {
        !self.is_paused()
            && self
                .audio
                .lock()
                .current
                .as_ref()
                .is_some_and(|t| t.opened)
    }

    pub fn state(&self) -> PlayerState {
        let position = self
            .audio
            .lock()
            .current
            .as_ref()
            .map(|t| t.position_ms(&self.context.format));
        PlayerState {
            time: now_ms(),
            position,
            connected: self
                .voice
                .existing(&self.guild_id)
                .is_some_and(|c| c.is_connected()),
        }
    }

    pub fn send_update(&self) {
        self.outbox.send_message(&OutgoingMessage::PlayerUpdate {
            guild_id: self.guild_id.clone(),
            state: self.state(),
        });
    }

    /// `(provided, missed)` frames over the last complete minute.
    pub fn frame_counts(&self, now: u64) -> Option<(u64, u64)> {
        self.loss.lock().last_minute(now)
    }

    fn ensure_updates(self: &Arc<Self>) {
        let mut slot = self.update_task.lock();
        if slot.is_some() {
            return;
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());

        let player = Arc::downgrade(self);
        let period = self.context.update_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(player) = player.upgrade() else { break };
                        if player.outbox.state() == SessionState::Active && player.has_track() {
                            player.send_update();
                        }
                    }
                }
            }
        });
    }

    fn stop_updates(&self) {
        if let Some(token) = self.update_task.lock().take() {
            token.cancel();
        }
    }

    fn finish(&self, encoded: String, ending: Ending) {
        self.stop_updates();
        self.loss.lock().on_stopped();
        match ending {
            Ending::Finished => self.emit_end(encoded, TrackEndReason::Finished),
            Ending::Marker => self.emit_end(encoded, TrackEndReason::Stopped),
            Ending::Failed(e) => {
                warn!("[{}] Playback failed: {}", self.guild_id, e);
                self.emit(PlayerEvent::TrackException {
                    guild_id: self.guild_id.clone(),
                    track: encoded.clone(),
                    exception: TrackException::from(e.to_friendly()),
                });
                self.emit_end(encoded, TrackEndReason::LoadFailed);
            }
        }
    }
}

/// Samples read outside the audio lock, waiting to be merged back.
struct ReadOutcome {
    blocks: Vec<Vec<i16>>,
    samples: u64,
    ending: Option<Ending>,
}

impl Player {
    /// Pulls raw blocks until `needed` samples are buffered or the track ends.
    ///
    /// Runs without the audio lock held, so a stalled source never blocks commands.
    fn read_blocks(
        &self,
        reader: &mut BoxedReader,
        start_ms: u64,
        end_marker: Option<u64>,
        needed: usize,
    ) -> ReadOutcome {
        let format = self.context.format;
        let mut outcome = ReadOutcome {
            blocks: Vec::new(),
            samples: 0,
            ending: None,
        };

        while (outcome.samples as usize) < needed {
            let position = start_ms + format.samples_to_ms(outcome.samples);
            if end_marker.is_some_and(|end| position >= end) {
                outcome.ending = Some(Ending::Marker);
                break;
            }

            let mut block = Vec::with_capacity(format.frame_samples());
            match reader.read(&mut block) {
                Ok(true) => {
                    outcome.samples += block.len() as u64;
                    outcome.blocks.push(block);
                }
                Ok(false) => {
                    outcome.ending = Some(Ending::Finished);
                    break;
                }
                Err(e) => {
                    outcome.ending = Some(Ending::Failed(e));
                    break;
                }
            }
        }
        outcome
    }

    fn next_frame(&self) -> (Option<Vec<i16>>, Option<(String, Ending)>) {
        let format = self.context.format;
        let frame_len = format.frame_samples();

        let (mut reader, generation, start_ms, end_marker, needed) = {
            let mut guard = self.audio.lock();
            let audio = &mut *guard;
            let buffered = audio.output.len();
            let Some(track) = audio.current.as_mut() else {
                return (None, None);
            };
            if buffered >= frame_len {
                return (Some(audio.output.drain(..frame_len).collect()), None);
            }
            // Still opening, or another pull holds the reader.
            let Some(reader) = track.reader.take() else {
                return (None, None);
            };
            (
                reader,
                self.generation.load(Ordering::Acquire),
                track.base_ms + format.samples_to_ms(track.consumed),
                track.end_marker,
                frame_len - buffered,
            )
        };

        let outcome = self.read_blocks(&mut reader, start_ms, end_marker, needed);

        let mut guard = self.audio.lock();
        let audio = &mut *guard;
        if self.generation.load(Ordering::Acquire) != generation {
            // Stopped or replaced while reading.
            return (None, None);
        }
        let Some(track) = audio.current.as_mut() else {
            return (None, None);
        };

        if let Some(position) = track.pending_seek.take() {
            if track.apply_seek(&mut reader, position, &self.guild_id) {
                audio.output.clear();
                audio.pipeline.reset();
                track.reader = Some(reader);
                return (None, None);
            }
        }
        track.reader = Some(reader);

        track.consumed += outcome.samples;
        for mut block in outcome.blocks {
            audio.pipeline.process(&mut block);
            audio.output.extend_from_slice(&block);
        }

        let ending = outcome.ending;
        let frame = if audio.output.len() >= frame_len {
            Some(audio.output.drain(..frame_len).collect::<Vec<_>>())
        } else if ending.is_some() && !audio.output.is_empty() {
            let mut tail: Vec<i16> = audio.output.drain(..).collect();
            tail.resize(frame_len, 0);
            Some(tail)
        } else {
            None
        };

        let ended = ending.and_then(|ending| {
            let track = audio.current.take()?;
            audio.output.clear();
            audio.pipeline.reset();
            self.generation.fetch_add(1, Ordering::AcqRel);
            Some((track.encoded, ending))
        });
        (frame, ended)
    }
}

impl FrameProvider for Player {
    fn provide_frame(&self) -> Option<Vec<i16>> {
        if self.is_paused() || !self.has_track() {
            return None;
        }
        let (frame, ended) = self.next_frame();

        {
            let mut loss = self.loss.lock();
            let now = now_ms();
            if frame.is_some() {
                loss.on_success(now);
            } else {
                loss.on_loss(now);
            }
        }

        if let Some((encoded, ending)) = ended {
            self.finish(encoded, ending);
        }
        frame
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use super::*;
    use crate::{
        audio::{PcmReader, test_support::VecReader},
        common::UserId,
        protocol::LoadResult,
        sources::SourcePlugin,
        voice::{MediaConnection, VoiceClient, VoiceEvent},
    };

    /// Blocks in `read` until released, reporting each entry on `entered`.
    struct StallingReader {
        entered: flume::Sender<()>,
        release: flume::Receiver<()>,
    }

    impl PcmReader for StallingReader {
        fn read(&mut self, out: &mut Vec<i16>) -> Result<bool, SourceError> {
            let _ = self.entered.send(());
            let _ = self.release.recv();
            out.extend_from_slice(&[0; 1920]);
            Ok(true)
        }

        fn seek(&mut self, position_ms: u64) -> Result<u64, SourceError> {
            Ok(position_ms)
        }
    }

    /// Opens every track as `length` ms of a constant 1000 signal.
    /// `fail:` identifiers fail to open and `stall:` ones block on every read.
    struct StubSource {
        opened: Arc<AtomicUsize>,
        entered: flume::Sender<()>,
        release: flume::Receiver<()>,
    }

    #[async_trait]
    impl SourcePlugin for StubSource {
        fn name(&self) -> &str {
            "stub"
        }

        fn can_handle(&self, _identifier: &str) -> bool {
            true
        }

        async fn load(&self, _identifier: &str) -> LoadResult {
            LoadResult::no_matches()
        }

        async fn open(
            &self,
            track: &TrackInfo,
            _format: AudioDataFormat,
        ) -> Result<BoxedReader, SourceError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            if track.identifier.starts_with("fail:") {
                return Err(SourceError::Other("no such track".into()));
            }
            if track.identifier.starts_with("stall:") {
                return Ok(Box::new(StallingReader {
                    entered: self.entered.clone(),
                    release: self.release.clone(),
                }));
            }
            Ok(Box::new(VecReader::constant(1000, track.length)))
        }
    }

    struct SilentConnection;

    impl MediaConnection for SilentConnection {
        fn connect(&self, _info: VoiceServerInfo) {}
        fn set_provider(&self, _provider: Option<Arc<dyn FrameProvider>>) {}
        fn is_connected(&self) -> bool {
            false
        }
        fn close(&self) {}
    }

    struct SilentVoice;

    impl VoiceClient for SilentVoice {
        fn create_connection(
            &self,
            _guild_id: &GuildId,
            _user_id: UserId,
            _events: flume::Sender<VoiceEvent>,
        ) -> Arc<dyn MediaConnection> {
            Arc::new(SilentConnection)
        }
    }

    struct Harness {
        player: Arc<Player>,
        events: flume::Receiver<String>,
        opened: Arc<AtomicUsize>,
        stalled: flume::Receiver<()>,
        release: flume::Sender<()>,
    }

    fn harness_with(filters: FiltersConfig) -> Harness {
        let opened = Arc::new(AtomicUsize::new(0));
        let (entered, stalled) = flume::unbounded();
        let (release, released) = flume::unbounded();
        let context = Arc::new(PlayerContext {
            sources: Arc::new(SourceManager::with_sources(vec![Box::new(StubSource {
                opened: opened.clone(),
                entered,
                release: released,
            })])),
            filters,
            update_interval: Duration::from_secs(5),
            format: AudioDataFormat::DISCORD_PCM,
        });
        let (tx, events) = flume::unbounded();
        let outbox = Arc::new(Outbox::new(tx));
        let voice = Arc::new(VoiceConnectionManager::new(
            Arc::new(SilentVoice),
            UserId(1),
            outbox.clone(),
        ));
        Harness {
            player: Player::new("1".into(), context, outbox, voice),
            events,
            opened,
            stalled,
            release,
        }
    }

    fn harness() -> Harness {
        harness_with(FiltersConfig::default())
    }

    fn track(identifier: &str, length: u64) -> Track {
        Track::new(TrackInfo {
            identifier: identifier.into(),
            title: identifier.into(),
            length,
            source_name: "stub".into(),
            ..Default::default()
        })
        .unwrap()
    }

    async fn next_message(events: &flume::Receiver<String>) -> Value {
        let json = tokio::time::timeout(Duration::from_secs(2), events.recv_async())
            .await
            .expect("timed out waiting for a message")
            .unwrap();
        serde_json::from_str(&json).unwrap()
    }

    async fn next_event(events: &flume::Receiver<String>) -> Value {
        loop {
            let message = next_message(events).await;
            if message["op"] == "event" {
                return message;
            }
        }
    }

    #[tokio::test]
    async fn play_emits_start_once_open() {
        let h = harness();
        let t = track("a", 100);
        assert!(h.player.play(PlayRequest::new(t.clone())));

        let event = next_event(&h.events).await;
        assert_eq!(event["type"], "TrackStartEvent");
        assert_eq!(event["track"], json!(t.track));
        assert_eq!(h.player.state().position, Some(0));
        assert!(h.player.is_playing());
    }

    #[tokio::test]
    async fn no_replace_keeps_the_current_track() {
        let h = harness();
        let first = track("a", 100);
        let mut request = PlayRequest::new(first.clone());
        request.no_replace = true;

        assert!(h.player.play(request.clone()));
        next_event(&h.events).await;
        assert!(!h.player.play(request));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.opened.load(Ordering::SeqCst), 1);
        assert!(h.events.try_recv().is_err());
        assert_eq!(h.player.track().unwrap().identifier, "a");
    }

    #[tokio::test]
    async fn replacing_ends_the_old_track_first() {
        let h = harness();
        let first = track("a", 100);
        h.player.play(PlayRequest::new(first.clone()));
        next_event(&h.events).await;

        h.player.play(PlayRequest::new(track("b", 100)));
        let end = next_event(&h.events).await;
        assert_eq!(end["type"], "TrackEndEvent");
        assert_eq!(end["reason"], "REPLACED");
        assert_eq!(end["track"], json!(first.track));
        assert_eq!(next_event(&h.events).await["type"], "TrackStartEvent");
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let h = harness();
        h.player.play(PlayRequest::new(track("a", 100)));
        next_event(&h.events).await;

        h.player.stop();
        h.player.stop();
        let end = next_event(&h.events).await;
        assert_eq!(end["reason"], "STOPPED");
        assert!(h.events.try_recv().is_err());
        assert!(!h.player.has_track());
        assert_eq!(h.player.state().position, None);
    }

    #[tokio::test]
    async fn exhausted_tracks_finish() {
        let h = harness();
        h.player.play(PlayRequest::new(track("a", 100)));
        next_event(&h.events).await;

        for _ in 0..5 {
            let frame = h.player.provide_frame().unwrap();
            assert_eq!(frame.len(), 1920);
            assert!(frame.iter().all(|s| *s == 1000));
        }
        assert!(h.player.provide_frame().is_none());

        let end = next_event(&h.events).await;
        assert_eq!(end["reason"], "FINISHED");
        assert!(!h.player.has_track());
    }

    #[tokio::test]
    async fn end_marker_stops_playback() {
        let h = harness();
        let mut request = PlayRequest::new(track("a", 1000));
        request.end_time = Some(40);
        h.player.play(request);
        next_event(&h.events).await;

        assert!(h.player.provide_frame().is_some());
        assert!(h.player.provide_frame().is_some());
        assert!(h.player.provide_frame().is_none());
        assert_eq!(next_event(&h.events).await["reason"], "STOPPED");
        assert!(h.player.provide_frame().is_none());
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn start_time_seeks_before_playing() {
        let h = harness();
        let mut request = PlayRequest::new(track("a", 1000));
        request.start_time = Some(500);
        h.player.play(request);
        next_event(&h.events).await;
        assert_eq!(h.player.state().position, Some(500));

        h.player.provide_frame();
        assert_eq!(h.player.state().position, Some(520));
    }

    #[tokio::test]
    async fn failed_opens_report_an_exception() {
        let h = harness();
        h.player.play(PlayRequest::new(track("fail:a", 100)));

        let exception = next_event(&h.events).await;
        assert_eq!(exception["type"], "TrackExceptionEvent");
        assert_eq!(exception["exception"]["severity"], "FAULT");
        let end = next_event(&h.events).await;
        assert_eq!(end["reason"], "LOAD_FAILED");
        assert!(!h.player.has_track());
    }

    #[tokio::test]
    async fn filters_apply_without_restarting_the_track() {
        let h = harness();
        h.player.play(PlayRequest::new(track("a", 1000)));
        next_event(&h.events).await;
        h.player.provide_frame();

        let chain = FilterChain::from_value(&json!({"volume": 0.5})).unwrap();
        h.player.set_filters(chain).unwrap();
        let frame = h.player.provide_frame().unwrap();
        assert!(frame.iter().all(|s| *s == 500));
        assert_eq!(h.player.state().position, Some(40));
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn rejected_filters_keep_the_previous_chain() {
        let h = harness_with(FiltersConfig {
            karaoke: false,
            ..FiltersConfig::default()
        });
        let good = FilterChain::from_value(&json!({"volume": 0.5})).unwrap();
        h.player.set_filters(good.clone()).unwrap();

        let bad = FilterChain::from_value(&json!({"karaoke": {"level": 0.5}})).unwrap();
        assert!(matches!(h.player.set_filters(bad), Err(FilterError::Disabled(_))));
        assert_eq!(h.player.filters(), good);
    }

    #[tokio::test]
    async fn volume_drives_the_volume_filter() {
        let h = harness();
        h.player.set_volume(2000);
        assert_eq!(h.player.volume(), 1000);
        assert_eq!(h.player.filters().volume, Some(VolumeConfig(10.0)));

        h.player.set_volume(50);
        h.player.play(PlayRequest::new(track("a", 100)));
        next_event(&h.events).await;
        let frame = h.player.provide_frame().unwrap();
        assert!(frame.iter().all(|s| *s == 500));
    }

    #[tokio::test]
    async fn pause_withholds_frames_and_broadcasts_state() {
        let h = harness();
        h.player.play(PlayRequest::new(track("a", 100)));
        next_event(&h.events).await;

        h.player.pause(true);
        let update = next_message(&h.events).await;
        assert_eq!(update["op"], "playerUpdate");
        assert_eq!(update["state"]["position"], 0);
        assert!(h.player.provide_frame().is_none());
        assert!(!h.player.is_playing());

        h.player.pause(false);
        assert!(h.player.provide_frame().is_some());
    }

    #[tokio::test]
    async fn seek_repositions_and_broadcasts() {
        let h = harness();
        h.player.play(PlayRequest::new(track("a", 1000)));
        next_event(&h.events).await;

        h.player.seek(300);
        let update = next_message(&h.events).await;
        assert_eq!(update["op"], "playerUpdate");
        assert_eq!(update["state"]["position"], 300);
    }

    #[tokio::test]
    async fn seek_without_a_track_is_a_no_op() {
        let h = harness();
        h.player.seek(300);
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_updates_run_while_a_track_is_assigned() {
        let h = harness();
        h.player.play(PlayRequest::new(track("a", 100_000)));
        assert_eq!(next_event(&h.events).await["type"], "TrackStartEvent");

        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(next_message(&h.events).await["op"], "playerUpdate");

        h.player.stop();
        next_event(&h.events).await;
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn play_without_pause_flag_unpauses() {
        let h = harness();
        h.player.play(PlayRequest::new(track("a", 100)));
        next_event(&h.events).await;
        h.player.pause(true);

        h.player.play(PlayRequest::new(track("b", 100)));
        assert!(!h.player.is_paused());
        loop {
            let event = next_event(&h.events).await;
            if event["type"] == "TrackStartEvent" {
                break;
            }
        }
        assert!(h.player.provide_frame().is_some());

        let mut request = PlayRequest::new(track("c", 100));
        request.pause = true;
        h.player.play(request);
        assert!(h.player.is_paused());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stalled_source_does_not_block_commands() {
        let h = harness();
        h.player.play(PlayRequest::new(track("stall:a", 1000)));
        assert_eq!(next_event(&h.events).await["type"], "TrackStartEvent");

        let release = h.release.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(2));
            let _ = release.send(());
        });
        let player = h.player.clone();
        let pacer = std::thread::spawn(move || player.provide_frame());
        tokio::time::timeout(Duration::from_secs(1), h.stalled.recv_async())
            .await
            .unwrap()
            .unwrap();

        let started = std::time::Instant::now();
        assert!(h.player.has_track());
        assert!(h.player.is_playing());
        h.player.send_update();
        h.player.set_volume(50);
        h.player.stop();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(!h.player.has_track());

        let end = next_event(&h.events).await;
        assert_eq!(end["reason"], "STOPPED");

        h.release.send(()).unwrap();
        assert!(pacer.join().unwrap().is_none());
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn seek_during_a_stalled_read_applies_afterwards() {
        let h = harness();
        h.player.play(PlayRequest::new(track("stall:a", 1000)));
        assert_eq!(next_event(&h.events).await["type"], "TrackStartEvent");

        let player = h.player.clone();
        let pacer = std::thread::spawn(move || player.provide_frame());
        tokio::time::timeout(Duration::from_secs(1), h.stalled.recv_async())
            .await
            .unwrap()
            .unwrap();

        h.player.seek(300);
        let update = next_message(&h.events).await;
        assert_eq!(update["op"], "playerUpdate");
        assert_eq!(update["state"]["position"], 300);

        h.release.send(()).unwrap();
        assert!(pacer.join().unwrap().is_none());
        assert_eq!(h.player.state().position, Some(300));
        assert!(h.player.has_track());
    }
}
