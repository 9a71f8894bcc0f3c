use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Shared secret clients must present. Empty disables authorization.
    pub password: Option<String>,
    /// Seconds between periodic `playerUpdate` pushes.
    pub player_update_interval: u64,
    /// Seconds between `stats` pushes.
    pub stats_interval: u64,
    /// Resume window for sessions that configure a key without a timeout.
    pub resume_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 2333,
            password: None,
            player_update_interval: 5,
            stats_interval: 60,
            resume_timeout: 60,
        }
    }
}

impl ServerConfig {
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    pub fn requires_auth(&self) -> bool {
        self.password().is_some()
    }
}
