use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::{FrameProvider, MediaConnection, VoiceClient, VoiceEvent, VoiceServerInfo};
use crate::{
    audio::AudioDataFormat,
    common::types::{GuildId, UserId},
};

const FRAME_INTERVAL: Duration = Duration::from_millis(AudioDataFormat::FRAME_DURATION_MS);
/// Beyond this lag the pacer stops trying to catch up.
const MAX_LAG: Duration = Duration::from_millis(100);

/// Voice client that paces providers in real time and discards the audio.
#[derive(Default)]
pub struct LocalVoiceClient;

impl LocalVoiceClient {
    pub fn new() -> Self {
        Self
    }
}

impl VoiceClient for LocalVoiceClient {
    fn create_connection(
        &self,
        guild_id: &GuildId,
        _user_id: UserId,
        events: flume::Sender<VoiceEvent>,
    ) -> Arc<dyn MediaConnection> {
        Arc::new(LocalConnection {
            shared: Arc::new(ConnectionShared {
                guild_id: guild_id.clone(),
                state: Mutex::new(ConnectionState::default()),
                events,
                frames_provided: AtomicU64::new(0),
                frames_missed: AtomicU64::new(0),
            }),
        })
    }
}

#[derive(Default)]
struct ConnectionState {
    info: Option<VoiceServerInfo>,
    provider: Option<Arc<dyn FrameProvider>>,
    pacer: Option<CancellationToken>,
    closed: bool,
}

struct ConnectionShared {
    guild_id: GuildId,
    state: Mutex<ConnectionState>,
    events: flume::Sender<VoiceEvent>,
    frames_provided: AtomicU64,
    frames_missed: AtomicU64,
}

pub struct LocalConnection {
    shared: Arc<ConnectionShared>,
}

impl LocalConnection {
    pub fn frames_provided(&self) -> u64 {
        self.shared.frames_provided.load(Ordering::Relaxed)
    }

    pub fn frames_missed(&self) -> u64 {
        self.shared.frames_missed.load(Ordering::Relaxed)
    }
}

fn pace(shared: Arc<ConnectionShared>, token: CancellationToken) {
    let mut deadline = Instant::now();
    while !token.is_cancelled() {
        let provider = shared.state.lock().provider.clone();
        if let Some(provider) = provider {
            match provider.provide_frame() {
                Some(_frame) => shared.frames_provided.fetch_add(1, Ordering::Relaxed),
                None => shared.frames_missed.fetch_add(1, Ordering::Relaxed),
            };
        }

        deadline += FRAME_INTERVAL;
        let now = Instant::now();
        if now > deadline + MAX_LAG {
            deadline = now;
        } else if deadline > now {
            thread::sleep(deadline - now);
        }
    }
    debug!("[{}] Frame pacer stopped", shared.guild_id);
}

impl MediaConnection for LocalConnection {
    fn connect(&self, info: VoiceServerInfo) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        debug!(
            "[{}] Voice target set to {} (session {})",
            self.shared.guild_id, info.endpoint, info.session_id
        );
        state.info = Some(info);

        if state.pacer.is_none() {
            let token = CancellationToken::new();
            let shared = self.shared.clone();
            let pacer = token.clone();
            let spawned = thread::Builder::new()
                .name(format!("voice-pacer-{}", self.shared.guild_id))
                .spawn(move || pace(shared, pacer));
            match spawned {
                Ok(_) => state.pacer = Some(token),
                Err(e) => error!("[{}] Failed to start frame pacer: {}", self.shared.guild_id, e),
            }
        }
    }

    fn set_provider(&self, provider: Option<Arc<dyn FrameProvider>>) {
        let mut state = self.shared.state.lock();
        if !state.closed {
            state.provider = provider;
        }
    }

    fn is_connected(&self) -> bool {
        let state = self.shared.state.lock();
        !state.closed && state.info.is_some()
    }

    fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.provider = None;
            state.info = None;
            if let Some(token) = state.pacer.take() {
                token.cancel();
            }
        }

        let _ = self.shared.events.send(VoiceEvent::Closed {
            code: 1000,
            reason: "Connection closed".to_string(),
            by_remote: false,
        });
    }
}

impl Drop for LocalConnection {
    fn drop(&mut self) {
        if let Some(token) = self.shared.state.lock().pacer.take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting(AtomicU64);

    impl FrameProvider for Counting {
        fn provide_frame(&self) -> Option<Vec<i16>> {
            self.0.fetch_add(1, Ordering::Relaxed);
            Some(vec![0; 1920])
        }
    }

    fn info() -> VoiceServerInfo {
        VoiceServerInfo {
            session_id: "s".into(),
            endpoint: "voice.example:443".into(),
            token: "t".into(),
        }
    }

    fn connection() -> (LocalConnection, flume::Receiver<VoiceEvent>) {
        let (tx, rx) = flume::unbounded();
        let conn = LocalConnection {
            shared: Arc::new(ConnectionShared {
                guild_id: "1".into(),
                state: Mutex::new(ConnectionState::default()),
                events: tx,
                frames_provided: AtomicU64::new(0),
                frames_missed: AtomicU64::new(0),
            }),
        };
        (conn, rx)
    }

    #[test]
    fn pulls_frames_once_connected() {
        let (conn, _rx) = connection();
        let provider = Arc::new(Counting(AtomicU64::new(0)));
        conn.set_provider(Some(provider.clone()));

        thread::sleep(Duration::from_millis(60));
        assert_eq!(provider.0.load(Ordering::Relaxed), 0);

        conn.connect(info());
        assert!(conn.is_connected());
        thread::sleep(Duration::from_millis(200));
        assert!(conn.frames_provided() >= 3);
        conn.close();
    }

    #[test]
    fn close_stops_pulling_and_reports_once() {
        let (conn, rx) = connection();
        let provider = Arc::new(Counting(AtomicU64::new(0)));
        conn.set_provider(Some(provider.clone()));
        conn.connect(info());
        thread::sleep(Duration::from_millis(60));

        conn.close();
        conn.close();
        thread::sleep(Duration::from_millis(60));
        let pulled = provider.0.load(Ordering::Relaxed);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(provider.0.load(Ordering::Relaxed), pulled);

        assert!(!conn.is_connected());
        assert!(matches!(rx.try_recv(), Ok(VoiceEvent::Closed { by_remote: false, .. })));
        assert!(rx.try_recv().is_err());
    }
}
