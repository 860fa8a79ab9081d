use std::path::Path;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use super::logging::LoggingConfig;
use super::session::SessionConfig;

/// A top-level enum for versioned configurations.
#[derive(Deserialize, Serialize, JsonSchema)]
#[serde(tag = "version")]
pub enum Config {
    #[serde(rename = "1.0.0")]
    ConfigV1(ConfigV1),
}

/// Main config for v1.0.0.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ConfigV1 {
    pub api: ApiConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the backend lives and which auth endpoints it exposes.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Per-request timeout for the HTTP client.
    #[serde(default = "default_timeout_in_ms")]
    pub timeout_in_ms: u64,
}

/// Behaviour of the authenticated request gateway.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct GatewayConfig {
    /// HTTP status the backend uses to signal an expired access token.
    #[serde(default = "default_auth_failure_status")]
    pub auth_failure_status: u16,
    /// Upper bound on the refresh call. Unset means wait indefinitely.
    #[serde(default)]
    pub refresh_timeout_in_ms: Option<u64>,
    /// Route published in logout events.
    #[serde(default = "default_login_route")]
    pub login_route: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            auth_failure_status: default_auth_failure_status(),
            refresh_timeout_in_ms: None,
            login_route: default_login_route(),
        }
    }
}

fn default_refresh_path() -> String {
    "/api/v1/auth/refresh-token".to_string()
}

fn default_login_path() -> String {
    "/api/v1/auth/login".to_string()
}

fn default_timeout_in_ms() -> u64 {
    30_000
}

fn default_auth_failure_status() -> u16 {
    403
}

fn default_login_route() -> String {
    "/login".to_string()
}

impl ConfigV1 {
    /// A config pointing at `base_url` with every other section defaulted.
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        ConfigV1 {
            api: ApiConfig {
                base_url: base_url.into(),
                refresh_path: default_refresh_path(),
                login_path: default_login_path(),
                timeout_in_ms: default_timeout_in_ms(),
            },
            gateway: GatewayConfig::default(),
            session: SessionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Build the figment used to load configuration.
///
/// The YAML file is overlaid with `FFUND_`-prefixed environment variables,
/// nested with `__` (e.g. `FFUND_API__BASE_URL`).
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Yaml::file(path))
        .merge(Env::prefixed("FFUND_").split("__"))
}

/// Load config from `path` (usually `./config.yaml`).
pub fn load_config(path: &Path) -> Result<ConfigV1, figment::Error> {
    parse_config(figment(path))
}

/// Extract a versioned config from an already assembled figment.
pub fn parse_config(figment: Figment) -> Result<ConfigV1, figment::Error> {
    match figment.extract::<Config>()? {
        Config::ConfigV1(c) => Ok(c),
    }
}

/// Render the JSON schema for the configuration.
pub fn config_schema() -> Result<String, serde_json::Error> {
    let schema = schema_for!(Config);
    serde_json::to_string_pretty(&schema)
}
