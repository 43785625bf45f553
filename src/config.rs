//! Catalog configuration (`config.toml`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// How servers from later layers combine with types an earlier layer already declared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicy {
    /// The first layer declaring a type owns it; later layers cannot add servers to it.
    #[default]
    FirstSeen,
    /// Every layer contributes servers to every type.
    Additive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub merge: MergePolicy,
    /// Read-only layers consulted between the user file and the system defaults.
    pub extra_layers: Vec<PathBuf>,
    /// Data type assigned to migrated legacy entries.
    pub legacy_type: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            merge: MergePolicy::default(),
            extra_layers: Vec::new(),
            legacy_type: "image".to_string(),
        }
    }
}

impl Config {
    /// Load from `path`. A missing file gives the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: Config = toml::from_str(content)?;
        config.extra_layers = config
            .extra_layers
            .iter()
            .map(|p| crate::paths::expand_tilde(&p.to_string_lossy()))
            .collect();
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config at {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config at {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
