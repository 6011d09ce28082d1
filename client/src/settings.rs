//! Sandbox configuration, read once at startup.
//!
//! The file is TOML. Every table is optional and falls back to defaults, so a config only
//! needs the values it overrides:
//!
//! ```toml
//! [path_following]
//! use_visibility_optimization = true
//!
//! [path_following.block_detection]
//! interval = 0.25
//!
//! [agents]
//! crowd_agents = 6
//! ```

use std::path::Path;

use bevy::prelude::*;
use navigation::{PathFollowingError, PathFollowingSettings};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable that overrides the config path.
pub const CONFIG_PATH_ENV: &str = "PATH_FOLLOWING_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "assets/path_following.toml";

#[derive(Resource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub path_following: PathFollowingSettings,
    pub agents: AgentConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub radius: f32,
    pub half_height: f32,
    pub patrol_agents: usize,
    pub crowd_agents: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            radius: 0.4,
            half_height: 0.9,
            patrol_agents: 2,
            crowd_agents: 6,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("can't read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("can't parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Invalid(#[from] PathFollowingError),

    #[error("agent radius and half height must be positive")]
    AgentShape,
}

impl SandboxConfig {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: SandboxConfig = toml::from_str(text)?;
        config.path_following.validate()?;
        if config.agents.radius <= 0.0 || config.agents.half_height < config.agents.radius {
            return Err(ConfigError::AgentShape);
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }
}

pub(super) fn plugin(app: &mut App) {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = match SandboxConfig::load(Path::new(&path)) {
        Ok(config) => {
            info!("loaded sandbox config from {path}");
            config
        }
        Err(ConfigError::Io(err)) => {
            info!("no sandbox config at {path} ({err}), using defaults");
            SandboxConfig::default()
        }
        Err(err) => {
            warn!("ignoring sandbox config {path}: {err}");
            SandboxConfig::default()
        }
    };
    app.insert_resource(config);
}
