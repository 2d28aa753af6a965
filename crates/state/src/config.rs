// Local configuration for threadspace tools.
//
// Global config: `~/.threadspace/config.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use threadspace_common::value::{SafeSerializer, SerializerOptions, DEFAULT_MAX_DEPTH};

use crate::security::{ensure_owner_only_dir, ensure_owner_only_file};

/// Root directory for threadspace state: `~/.threadspace/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".threadspace"))
}

/// Path to the global config file: `~/.threadspace/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

/// Default storage directory: `~/.threadspace/state/`.
pub fn default_storage_dir() -> Option<PathBuf> {
    global_dir().map(|d| d.join("state"))
}

/// Configuration at `~/.threadspace/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct StateConfig {
    pub storage: StorageConfig,
    pub serializer: SerializerConfig,
    pub logging: LoggingConfig,
}

impl StateConfig {
    /// Load from `~/.threadspace/config.toml`. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        global_config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
            ensure_owner_only_dir(parent).map_err(ConfigError::Io)?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)?;
        ensure_owner_only_file(path).map_err(ConfigError::Io)
    }

    /// Configured storage directory, falling back to `~/.threadspace/state/`.
    pub fn storage_dir(&self) -> Option<PathBuf> {
        self.storage.dir.clone().or_else(default_storage_dir)
    }

    /// Serializer built from the `[serializer]` section. Configured
    /// fragments extend the built-in deny-list.
    pub fn serializer(&self) -> SafeSerializer {
        let mut options = SerializerOptions::with_extra_denied(
            self.serializer.denied_class_fragments.iter().cloned(),
        );
        options.max_depth = self.serializer.max_depth.max(1);
        SafeSerializer::new(options)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory holding one `<key>.json` file per record.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SerializerConfig {
    /// Maximum nesting depth walked before giving up.
    pub max_depth: usize,
    /// Extra class-name fragments to treat as non-data.
    pub denied_class_fragments: Vec<String>,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self { max_depth: DEFAULT_MAX_DEPTH, denied_class_fragments: Vec::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive, used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: "warn".into() }
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
