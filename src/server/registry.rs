use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::{
  common::types::{ConnectionId, UserId, now_ms},
  configs::ServerConfig,
  monitoring::{StatsCollector, average_frame_stats},
  player::PlayerContext,
  protocol::{OutgoingMessage, Stats},
  server::{outbox::SessionState, session::Session},
  voice::VoiceClient,
};

/// Identity presented by a transport that passed authorization.
#[derive(Debug, Clone)]
pub struct Handshake {
  pub user_id: UserId,
  pub client_name: Option<String>,
}

/// A session taken out of the paused table by a resume handshake.
///
/// If the transport upgrade never completes, dropping the guard parks the
/// session again under its key.
pub struct PendingResume {
  registry: Arc<SessionRegistry>,
  session: Option<Arc<Session>>,
}

impl PendingResume {
  fn take(mut self) -> Option<Arc<Session>> {
    self.session.take()
  }
}

impl Drop for PendingResume {
  fn drop(&mut self) {
    if let Some(session) = self.session.take() {
      warn!("Resume of user {} abandoned before upgrade", session.user_id);
      self.registry.park(session);
    }
  }
}

/// Owns live sessions and the paused sessions waiting to be resumed.
pub struct SessionRegistry {
  sessions: DashMap<ConnectionId, Arc<Session>>,
  /// Keyed by resume key. At most one session per key.
  resumable: DashMap<String, Arc<Session>>,
  voice_client: Arc<dyn VoiceClient>,
  player_context: Arc<PlayerContext>,
  config: ServerConfig,
  stats: Arc<StatsCollector>,
}

impl SessionRegistry {
  pub fn new(
    config: ServerConfig,
    voice_client: Arc<dyn VoiceClient>,
    player_context: Arc<PlayerContext>,
    stats: Arc<StatsCollector>,
  ) -> Arc<Self> {
    Arc::new(Self {
      sessions: DashMap::new(),
      resumable: DashMap::new(),
      voice_client,
      player_context,
      config,
      stats,
    })
  }

  pub fn get(&self, connection_id: &ConnectionId) -> Option<Arc<Session>> {
    self.sessions.get(connection_id).map(|s| s.clone())
  }

  pub fn is_resumable(&self, key: &str) -> bool {
    self.resumable.contains_key(key)
  }

  pub fn session_count(&self) -> usize {
    self.sessions.len()
  }

  /// Removes the paused session registered under `key`. Removal is the
  /// single point where a resume and an expiring timer race; whoever removes
  /// the entry wins.
  pub fn claim(self: &Arc<Self>, key: &str) -> Option<PendingResume> {
    let (_, session) = self.resumable.remove(key)?;
    session.cancel_resume_timer();
    info!("Claimed paused session of user {} for resume", session.user_id);
    Some(PendingResume {
      registry: self.clone(),
      session: Some(session),
    })
  }

  /// Binds a transport to a session. Returns the session and whether it was resumed.
  pub fn attach(
    self: &Arc<Self>,
    connection_id: ConnectionId,
    pending: Option<PendingResume>,
    handshake: Handshake,
    sender: flume::Sender<String>,
  ) -> (Arc<Session>, bool) {
    if let Some(session) = pending.and_then(PendingResume::take) {
      session.rebind(connection_id.clone());
      self.sessions.insert(connection_id.clone(), session.clone());

      match session.outbox().resume(sender.clone()) {
        Some(replayed) => {
          info!(
            "Resumed session of user {} on {}, replayed {} events",
            session.user_id, connection_id, replayed
          );
          for player in session.players() {
            player.send_update();
          }
          return (session, true);
        }
        None => {
          // Terminated between claim and attach.
          self.sessions.remove(&connection_id);
          warn!("Session of user {} ended before it could resume", session.user_id);
        }
      }
    }

    (self.create(connection_id, handshake, sender), false)
  }

  fn create(
    self: &Arc<Self>,
    connection_id: ConnectionId,
    handshake: Handshake,
    sender: flume::Sender<String>,
  ) -> Arc<Session> {
    let session = Arc::new(Session::new(
      connection_id.clone(),
      handshake.user_id,
      handshake.client_name,
      sender,
      self.voice_client.clone(),
      self.player_context.clone(),
      self.config.resume_timeout,
    ));
    self.sessions.insert(connection_id.clone(), session.clone());
    self.spawn_stats(&session);
    info!("New session {} for user {}", connection_id, session.user_id);
    session
  }

  /// Called when a transport closes. Parks the session if it has a resume key,
  /// otherwise shuts it down.
  pub fn disconnect(self: &Arc<Self>, connection_id: &ConnectionId) {
    let Some((_, session)) = self.sessions.remove(connection_id) else {
      return;
    };

    if session.resume_settings().key.is_none() {
      info!("Connection {} closed, shutting down session", connection_id);
      session.shutdown();
      return;
    }
    if session.outbox().pause() {
      self.park(session);
    }
  }

  /// Registers a paused session under its resume key and arms the expiry timer.
  fn park(self: &Arc<Self>, session: Arc<Session>) {
    let settings = session.resume_settings();
    let Some(key) = settings.key else {
      session.shutdown();
      return;
    };
    let timeout = Duration::from_secs(settings.timeout);
    let token = session.arm_resume_timer();

    if let Some(stale) = self.resumable.insert(key.clone(), session.clone()) {
      if !Arc::ptr_eq(&stale, &session) {
        warn!("Evicting stale paused session of user {}", stale.user_id);
        stale.shutdown();
      }
    }
    info!(
      "Session of user {} paused, resumable for {}s",
      session.user_id, settings.timeout
    );

    let registry = Arc::downgrade(self);
    tokio::spawn(async move {
      tokio::select! {
        _ = token.cancelled() => {}
        _ = tokio::time::sleep(timeout) => {
          let Some(registry) = registry.upgrade() else {
            return;
          };
          if registry
            .resumable
            .remove_if(&key, |_, s| Arc::ptr_eq(s, &session))
            .is_some()
          {
            info!("Resume window of user {} expired", session.user_id);
            session.shutdown();
          }
        }
      }
    });
  }

  /// Terminates every live and paused session.
  pub fn shutdown_all(&self) {
    let live: Vec<Arc<Session>> = self.sessions.iter().map(|e| e.value().clone()).collect();
    self.sessions.clear();
    let paused: Vec<Arc<Session>> = self.resumable.iter().map(|e| e.value().clone()).collect();
    self.resumable.clear();
    for session in live.into_iter().chain(paused) {
      session.shutdown();
    }
  }

  /// Node-wide player counts with frame stats scoped to `session`.
  pub fn stats_for(&self, session: &Session) -> Stats {
    let sessions: Vec<Arc<Session>> = self
      .sessions
      .iter()
      .map(|e| e.value().clone())
      .chain(self.resumable.iter().map(|e| e.value().clone()))
      .collect();

    let mut players = 0;
    let mut playing = 0;
    for s in sessions {
      for player in s.players() {
        players += 1;
        if player.is_playing() {
          playing += 1;
        }
      }
    }

    let now = now_ms();
    let counts: Vec<(u64, u64)> = session
      .players()
      .iter()
      .filter(|p| p.is_playing())
      .filter_map(|p| p.frame_counts(now))
      .collect();

    self.stats.collect(players, playing, average_frame_stats(&counts))
  }

  fn spawn_stats(self: &Arc<Self>, session: &Arc<Session>) {
    let registry = Arc::downgrade(self);
    let weak = Arc::downgrade(session);
    let token = session.tasks();
    let period = Duration::from_secs(self.config.stats_interval.max(1));

    tokio::spawn(async move {
      let mut interval = tokio::time::interval(period);
      loop {
        tokio::select! {
          _ = token.cancelled() => break,
          _ = interval.tick() => {
            let (Some(registry), Some(session)) = (registry.upgrade(), weak.upgrade()) else {
              break;
            };
            if session.state() != SessionState::Active {
              continue;
            }
            let stats = registry.stats_for(&session);
            session.send(&OutgoingMessage::Stats { stats });
          }
        }
      }
      debug!("Stats task stopped");
    });
  }
}
