use serde::Serialize;

/// Node statistics pushed periodically to every active session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
  pub players: usize,
  pub playing_players: usize,
  /// Milliseconds since the node started.
  pub uptime: u64,
  pub memory: Memory,
  pub cpu: Cpu,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub frame_stats: Option<FrameStats>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Memory {
  pub free: u64,
  pub used: u64,
  pub allocated: u64,
  pub reservable: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cpu {
  pub cores: usize,
  pub system_load: f64,
  pub lavalink_load: f64,
}

/// Average per playing player over the last minute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameStats {
  pub sent: i64,
  pub nulled: i64,
  pub deficit: i64,
}
