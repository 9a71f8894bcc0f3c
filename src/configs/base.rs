use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{common::types::AnyResult, configs::*};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
  #[serde(default)]
  pub server: ServerConfig,
  #[serde(default)]
  pub route_planner: RoutePlannerConfig,
  #[serde(default)]
  pub sources: SourcesConfig,
  #[serde(default)]
  pub filters: FiltersConfig,
  pub logging: Option<LoggingConfig>,
}

impl Config {
  pub const PATHS: [&'static str; 2] = ["config.toml", "config.default.toml"];

  /// Loads the first configuration file found, or built-in defaults when there is none.
  pub fn load() -> AnyResult<Self> {
    match Self::PATHS.iter().find(|p| Path::new(p).exists()) {
      Some(path) => Self::load_from(path),
      None => Ok(Self::default()),
    }
  }

  pub fn load_from(path: impl AsRef<Path>) -> AnyResult<Self> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)?;
    let config = Self::parse(&raw)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
  }

  pub fn parse(raw: &str) -> AnyResult<Self> {
    if raw.trim().is_empty() {
      return Err("configuration is empty".into());
    }
    Ok(toml::from_str(raw)?)
  }
}
