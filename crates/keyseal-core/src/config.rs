//! Configuration model and helpers used by keyseal binaries.

use crate::error::{KeysealError, KeysealResult};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/keyseal.toml";

/// Directory probed for modern keyring support. Any directory on an
/// fscrypt-capable filesystem works; the kernel either supports the key
/// management ioctls everywhere or nowhere.
pub const DEFAULT_PROBE_PATH: &str = "/data";

/// Deployment settings. Everything compatibility-critical (backoff schedule,
/// name prefixes, specifier sizes) is compiled in; only host-specific paths
/// are configurable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysealConfig {
    /// Directory used by the one-time modern-keyring capability probe.
    pub probe_path: PathBuf,
}

impl Default for KeysealConfig {
    fn default() -> Self {
        Self {
            probe_path: PathBuf::from(DEFAULT_PROBE_PATH),
        }
    }
}

impl KeysealConfig {
    /// Load configuration from `path`, falling back to defaults when the file
    /// does not exist.
    pub fn load(path: &Path) -> KeysealResult<Self> {
        if !path.exists() {
            info!(
                "configuration missing at {}; using built-in defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|err| {
            KeysealError::InvalidConfig(format!("failed to parse {}: {err}", path.display()))
        })
    }
}
