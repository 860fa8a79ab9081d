use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Session persistence and role gating.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct SessionConfig {
    /// Roles allowed to use the dashboard API.
    #[serde(default = "default_allowed_roles")]
    pub allowed_roles: Vec<String>,
    #[serde(default)]
    pub store: SessionStoreConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            allowed_roles: default_allowed_roles(),
            store: SessionStoreConfig::default(),
        }
    }
}

fn default_allowed_roles() -> Vec<String> {
    vec!["ADMIN".to_string(), "MANAGER".to_string()]
}

/// The session store backends, selected via a "type" tag in the YAML.
#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
#[serde(tag = "type")]
pub enum SessionStoreConfig {
    /// Session lives only as long as the process.
    #[serde(rename = "memory")]
    #[default]
    Memory,
    /// Session is kept in a JSON file between runs.
    #[serde(rename = "file")]
    File { path: PathBuf },
}
