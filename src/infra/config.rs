use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::infra::error::AppError;

const DEFAULT_CONFIG_PATH: &str = "tether.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct SyncConfig {
    pub logging: LogConfig,
    pub collections: CollectionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

/// Names of the remote collections the engine reads and writes. Messages are
/// a subcollection under each chat document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CollectionConfig {
    pub users: String,
    pub chats: String,
    pub messages: String,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            users: "users".to_owned(),
            chats: "chats".to_owned(),
            messages: "messages".to_owned(),
        }
    }
}

/// Loads configuration from a TOML file, falling back to defaults when the
/// file does not exist. Partial files are fine: absent sections and keys
/// keep their defaults.
pub fn load(path: Option<&Path>) -> Result<SyncConfig, AppError> {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    if !config_path.exists() {
        return Ok(SyncConfig::default());
    }

    let raw = fs::read_to_string(&config_path).map_err(|source| AppError::ConfigRead {
        path: config_path.clone(),
        source,
    })?;

    toml::from_str(&raw).map_err(|source| AppError::ConfigParse {
        path: config_path,
        source,
    })
}
