use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
  common::types::{ConnectionId, GuildId, UserId},
  player::{Player, PlayerContext},
  protocol::OutgoingMessage,
  server::outbox::{Outbox, SessionState},
  voice::{VoiceClient, VoiceConnectionManager},
};

/// What happens to the session on its next disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeSettings {
  pub key: Option<String>,
  /// Seconds.
  pub timeout: u64,
}

/// A single client session.
pub struct Session {
  pub user_id: UserId,
  pub client_name: Option<String>,
  connection_id: Mutex<ConnectionId>,
  outbox: Arc<Outbox>,
  voice: Arc<VoiceConnectionManager>,
  players: DashMap<GuildId, Arc<Player>>,
  player_context: Arc<PlayerContext>,
  resume: Mutex<ResumeSettings>,
  /// Armed while the session sits in the paused table.
  resume_timer: Mutex<Option<CancellationToken>>,
  /// Parent of every session-scoped background task.
  tasks: CancellationToken,
}

impl Session {
  pub fn new(
    connection_id: ConnectionId,
    user_id: UserId,
    client_name: Option<String>,
    sender: flume::Sender<String>,
    voice_client: Arc<dyn VoiceClient>,
    player_context: Arc<PlayerContext>,
    resume_timeout: u64,
  ) -> Self {
    let outbox = Arc::new(Outbox::new(sender));
    let voice = Arc::new(VoiceConnectionManager::new(
      voice_client,
      user_id,
      outbox.clone(),
    ));
    Self {
      user_id,
      client_name,
      connection_id: Mutex::new(connection_id),
      outbox,
      voice,
      players: DashMap::new(),
      player_context,
      resume: Mutex::new(ResumeSettings {
        key: None,
        timeout: resume_timeout,
      }),
      resume_timer: Mutex::new(None),
      tasks: CancellationToken::new(),
    }
  }

  pub fn connection_id(&self) -> ConnectionId {
    self.connection_id.lock().clone()
  }

  pub(crate) fn rebind(&self, connection_id: ConnectionId) {
    *self.connection_id.lock() = connection_id;
  }

  pub fn outbox(&self) -> &Arc<Outbox> {
    &self.outbox
  }

  pub fn state(&self) -> SessionState {
    self.outbox.state()
  }

  pub fn send(&self, msg: &OutgoingMessage) {
    self.outbox.send_message(msg);
  }

  /// Token cancelled when the session terminates.
  pub fn tasks(&self) -> CancellationToken {
    self.tasks.clone()
  }

  /// Returns the room's player, creating it on first reference.
  ///
  /// `None` once the session has terminated, so shutdown never leaves a player behind.
  pub fn player(&self, guild_id: &GuildId) -> Option<Arc<Player>> {
    if self.state() == SessionState::Terminated {
      return None;
    }
    let player = self
      .players
      .entry(guild_id.clone())
      .or_insert_with(|| {
        debug!("[{}] Creating player for user {}", guild_id, self.user_id);
        Player::new(
          guild_id.clone(),
          self.player_context.clone(),
          self.outbox.clone(),
          self.voice.clone(),
        )
      })
      .clone();

    // Shutdown may have taken its snapshot between the check and the insert.
    if self.state() == SessionState::Terminated {
      if let Some((_, orphan)) = self.players.remove(guild_id) {
        orphan.destroy();
      }
      return None;
    }
    Some(player)
  }

  pub fn existing_player(&self, guild_id: &GuildId) -> Option<Arc<Player>> {
    self.players.get(guild_id).map(|p| p.clone())
  }

  pub fn players(&self) -> Vec<Arc<Player>> {
    self.players.iter().map(|e| e.value().clone()).collect()
  }

  pub fn player_count(&self) -> usize {
    self.players.len()
  }

  pub fn voice(&self) -> &Arc<VoiceConnectionManager> {
    &self.voice
  }

  /// Removes the room's player and releases its voice connection.
  pub fn destroy_player(&self, guild_id: &GuildId) {
    match self.players.remove(guild_id) {
      Some((_, player)) => player.destroy(),
      None => self.voice.release(guild_id),
    }
  }

  /// Applies to the next disconnect. A missing timeout keeps the current one.
  pub fn configure_resuming(&self, key: Option<String>, timeout: Option<u64>) {
    let mut resume = self.resume.lock();
    resume.key = key.filter(|k| !k.is_empty());
    if let Some(timeout) = timeout {
      resume.timeout = timeout;
    }
    debug!(
      "Resuming configured for {}: key set = {}, timeout = {}s",
      self.user_id,
      resume.key.is_some(),
      resume.timeout
    );
  }

  pub fn resume_settings(&self) -> ResumeSettings {
    self.resume.lock().clone()
  }

  /// Replaces any armed timer with a fresh one.
  pub(crate) fn arm_resume_timer(&self) -> CancellationToken {
    let token = self.tasks.child_token();
    if let Some(old) = self.resume_timer.lock().replace(token.clone()) {
      old.cancel();
    }
    token
  }

  pub(crate) fn cancel_resume_timer(&self) {
    if let Some(token) = self.resume_timer.lock().take() {
      token.cancel();
    }
  }

  /// Stops every player, releases every voice connection and cancels every
  /// timer. Only the first call does anything.
  pub fn shutdown(&self) {
    if !self.outbox.terminate() {
      return;
    }
    info!(
      "Shutting down session of user {} ({} players)",
      self.user_id,
      self.players.len()
    );

    self.cancel_resume_timer();
    self.tasks.cancel();

    let guilds: Vec<GuildId> = self.players.iter().map(|e| e.key().clone()).collect();
    for guild_id in guilds {
      if let Some((_, player)) = self.players.remove(&guild_id) {
        player.destroy();
      }
    }
    self.voice.release_all();
  }
}
