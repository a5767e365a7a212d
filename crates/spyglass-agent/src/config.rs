//! Agent configuration: TOML file + `SPYGLASS_`-prefixed environment
//! variables, layered with figment. The `[bridge]` table is passed to
//! the core verbatim as its flat key map, so every key from the
//! protocol documentation (`maxDepth`, `historyMaxEntries`,
//! `policyLocation`, ...) works unchanged.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

/// Top-level agent configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct AgentConfig {
    /// Listen address for the HTTP endpoint.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Register the built-in demo beans at startup.
    #[serde(default)]
    pub demo: bool,

    /// Flat key map handed to the bridge core.
    #[serde(default)]
    pub bridge: HashMap<String, String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            demo: false,
            bridge: HashMap::new(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:8778".to_owned()
}

impl AgentConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen.parse().map_err(|_| ConfigError::Validation {
            field: "listen".into(),
            reason: format!("not a socket address: {}", self.listen),
        })
    }
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "spyglass", "spyglass")
        .map(|dirs| dirs.config_dir().join("agent.toml"))
        .unwrap_or_else(|| PathBuf::from("spyglass-agent.toml"))
}

/// Load the config: defaults, then the TOML file (explicit path or the
/// platform default), then `SPYGLASS_*` environment variables.
pub fn load_config(file: Option<&Path>) -> Result<AgentConfig, ConfigError> {
    let path = file.map(Path::to_path_buf).unwrap_or_else(config_path);

    let figment = Figment::new()
        .merge(Serialized::defaults(AgentConfig::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("SPYGLASS_").split("__"));

    Ok(figment.extract()?)
}
