use std::sync::Arc;

use parking_lot::Mutex;

/// A thread-safe, mutually exclusive shared component.
pub type Shared<T> = Arc<Mutex<T>>;

/// A generic boxed error type.
pub type AnyError = Box<dyn std::error::Error + Send + Sync>;

/// A convenient Result alias returning `AnyError`.
pub type AnyResult<T> = std::result::Result<T, AnyError>;

/// Room identifier as sent by clients (a Discord snowflake rendered as a string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct GuildId(pub String);

impl GuildId {
  /// Guild ids must be numeric snowflakes.
  pub fn parse(raw: &str) -> Option<Self> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
      return None;
    }
    Some(Self(raw.to_string()))
  }
}

impl From<String> for GuildId {
  fn from(s: String) -> Self {
    Self(s)
  }
}

impl From<&str> for GuildId {
  fn from(s: &str) -> Self {
    Self(s.to_string())
  }
}

impl std::ops::Deref for GuildId {
  type Target = str;
  fn deref(&self) -> &Self::Target {
    &self.0
  }
}

impl std::fmt::Display for GuildId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Identity of one websocket transport. A resumed session is rebound to a new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub String);

impl ConnectionId {
  pub fn generate() -> Self {
    Self(uuid::Uuid::new_v4().simple().to_string())
  }
}

impl std::ops::Deref for ConnectionId {
  type Target = str;
  fn deref(&self) -> &Self::Target {
    &self.0
  }
}

impl std::fmt::Display for ConnectionId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl From<u64> for UserId {
  fn from(u: u64) -> Self {
    Self(u)
  }
}

impl std::fmt::Display for UserId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Milliseconds since the unix epoch.
pub fn now_ms() -> u64 {
  std::time::SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .map(|d| d.as_millis() as u64)
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn guild_ids_must_be_numeric() {
    assert_eq!(GuildId::parse(" 1234 "), Some(GuildId::from("1234")));
    assert_eq!(GuildId::parse("12a4"), None);
    assert_eq!(GuildId::parse(""), None);
  }

  #[test]
  fn connection_ids_are_unique() {
    assert_ne!(ConnectionId::generate(), ConnectionId::generate());
  }
}
