//! Configuration management.
//!
//! scene-runtime configuration can come from:
//! - Config file (~/.config/scene-runtime/config.toml)
//! - Environment variables (SCENE_*)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// scene-runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Script executor configuration
    #[serde(default)]
    pub script: ScriptConfig,
}

/// Script executor configuration.
///
/// The limits keep user-supplied inline code from running away with the
/// process; they mirror the sandbox applied to event filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Directory `require` resolves module names against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_dir: Option<PathBuf>,

    /// Maximum operations per script invocation
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,

    /// Maximum function call nesting
    #[serde(default = "default_max_call_levels")]
    pub max_call_levels: usize,

    /// Maximum string size in bytes
    #[serde(default = "default_max_string_size")]
    pub max_string_size: usize,

    /// Maximum array length
    #[serde(default = "default_max_array_size")]
    pub max_array_size: usize,

    /// Maximum object map size
    #[serde(default = "default_max_map_size")]
    pub max_map_size: usize,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            module_dir: None,
            max_operations: default_max_operations(),
            max_call_levels: default_max_call_levels(),
            max_string_size: default_max_string_size(),
            max_array_size: default_max_array_size(),
            max_map_size: default_max_map_size(),
        }
    }
}

impl ScriptConfig {
    /// Set the module directory.
    pub fn with_module_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.module_dir = Some(dir.into());
        self
    }

    /// Set the operation limit.
    pub fn with_max_operations(mut self, max: u64) -> Self {
        self.max_operations = max;
        self
    }
}

fn default_max_operations() -> u64 {
    100_000
}

fn default_max_call_levels() -> usize {
    32
}

fn default_max_string_size() -> usize {
    1024 * 1024
}

fn default_max_array_size() -> usize {
    10_000
}

fn default_max_map_size() -> usize {
    10_000
}

impl Config {
    /// Load configuration from default locations.
    pub fn load() -> Self {
        let path = Self::config_dir().join("config.toml");
        Self::load_from(&path)
    }

    /// Load configuration from a specific file, falling back to defaults
    /// when it is missing or invalid. Environment overrides always apply.
    pub fn load_from(path: &Path) -> Self {
        let mut config = Self::default();

        if let Ok(partial) = Self::load_partial_from_path(path) {
            config.apply_partial(partial);
        }

        config.apply_env_overrides();
        config
    }

    /// Get the config directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("scene-runtime"))
            .unwrap_or_else(|| PathBuf::from(".scene-runtime"))
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("SCENE_MODULE_DIR") {
            self.script.module_dir = Some(PathBuf::from(dir));
        }
        if let Ok(max) = std::env::var("SCENE_MAX_OPERATIONS") {
            if let Ok(parsed) = max.parse::<u64>() {
                self.script.max_operations = parsed;
            }
        }
        if let Ok(levels) = std::env::var("SCENE_MAX_CALL_LEVELS") {
            if let Ok(parsed) = levels.parse::<usize>() {
                self.script.max_call_levels = parsed;
            }
        }
    }

    fn load_partial_from_path(path: &Path) -> std::result::Result<PartialConfig, ()> {
        let content = std::fs::read_to_string(path).map_err(|_| ())?;
        toml::from_str(&content).map_err(|_| ())
    }

    fn apply_partial(&mut self, partial: PartialConfig) {
        if let Some(script) = partial.script {
            self.script = script;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    script: Option<ScriptConfig>,
}
