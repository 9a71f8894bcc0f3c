use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SourcesConfig {
    pub local: bool,
    pub http: bool,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            local: true,
            http: true,
        }
    }
}
