//! Configuration for maskpaint.
//!
//! Settings come from an optional JSON file in the user config directory,
//! overridden by the environment variables `TOP_WORK_DIR`, `WORKSET`,
//! `ACCEPTED` and `SEGMENTATION_MODEL`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BRUSH_SIZE, DEFAULT_LABEL_OPACITY, DEFAULT_MODEL_ASSIST_OPACITY, DEFAULT_ROI_OPACITY,
    MAX_BRUSH_SIZE, MIN_BRUSH_SIZE,
};
use crate::keybindings::KeyBindings;

/// Log level setting for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Show only errors
    Error,
    /// Show errors and warnings
    Warn,
    /// Show errors, warnings, and info messages
    #[default]
    Info,
    /// Show debug-level logging
    Debug,
    /// Show all log messages including trace
    Trace,
}

impl LogLevel {
    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Current configuration file format version.
/// Increment this when making breaking changes to the config format.
pub const CONFIG_VERSION: u32 = 1;

/// Environment variable naming the top work directory.
pub const ENV_TOP_WORK_DIR: &str = "TOP_WORK_DIR";
/// Environment variable naming the workset directory.
pub const ENV_WORKSET: &str = "WORKSET";
/// Environment variable naming the accepted corpus directory.
pub const ENV_ACCEPTED: &str = "ACCEPTED";
/// Environment variable holding the segmentation model command.
pub const ENV_SEGMENTATION_MODEL: &str = "SEGMENTATION_MODEL";

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version of the configuration file format
    pub version: u32,

    /// Dataset locations and model
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Brush limits
    #[serde(default)]
    pub brush: BrushConfig,

    /// Initial layer opacities
    #[serde(default)]
    pub layers: LayerConfig,

    /// Keyboard shortcuts
    #[serde(default)]
    pub keybindings: KeyBindings,

    /// User preferences
    #[serde(default)]
    pub preferences: UserPreferences,
}

/// Where the dataset lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory holding `classes.json`, the workset and the accepted corpus
    #[serde(default)]
    pub top_work_dir: PathBuf,

    /// Workset directory name under `top_work_dir`
    #[serde(default = "default_workset")]
    pub workset: String,

    /// Accepted corpus directory name under `top_work_dir`
    #[serde(default = "default_accepted")]
    pub accepted: String,

    /// Segmentation model command, `None` when no model is available
    #[serde(default)]
    pub segmentation_model: Option<String>,
}

fn default_workset() -> String {
    "workset".to_string()
}

fn default_accepted() -> String {
    "accepted".to_string()
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            top_work_dir: PathBuf::new(),
            workset: default_workset(),
            accepted: default_accepted(),
            segmentation_model: None,
        }
    }
}

/// Brush diameter settings in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrushConfig {
    pub default_size: u32,
    pub min_size: u32,
    pub max_size: u32,
}

impl Default for BrushConfig {
    fn default() -> Self {
        Self {
            default_size: DEFAULT_BRUSH_SIZE,
            min_size: MIN_BRUSH_SIZE,
            max_size: MAX_BRUSH_SIZE,
        }
    }
}

/// Initial layer opacities in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    pub label_opacity: u8,
    pub model_assist_opacity: u8,
    pub roi_opacity: u8,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            label_opacity: DEFAULT_LABEL_OPACITY,
            model_assist_opacity: DEFAULT_MODEL_ASSIST_OPACITY,
            roi_opacity: DEFAULT_ROI_OPACITY,
        }
    }
}

/// User preferences section of the config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPreferences {
    /// Log verbosity level
    #[serde(default)]
    pub log_level: LogLevel,
}

impl AppConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION,
            workspace: WorkspaceConfig::default(),
            brush: BrushConfig::default(),
            layers: LayerConfig::default(),
            keybindings: KeyBindings::default(),
            preferences: UserPreferences::default(),
        }
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;

        // Validate version compatibility
        if config.version > CONFIG_VERSION {
            return Err(ConfigError::VersionTooNew {
                file_version: config.version,
                supported_version: CONFIG_VERSION,
            });
        }

        Ok(config)
    }

    /// Override workspace settings from a variable lookup.
    ///
    /// An empty `SEGMENTATION_MODEL` disables the model.
    pub fn apply_lookup<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(top) = lookup(ENV_TOP_WORK_DIR) {
            self.workspace.top_work_dir = expand_home(&top);
        }
        if let Some(workset) = lookup(ENV_WORKSET) {
            self.workspace.workset = workset;
        }
        if let Some(accepted) = lookup(ENV_ACCEPTED) {
            self.workspace.accepted = accepted;
        }
        if let Some(model) = lookup(ENV_SEGMENTATION_MODEL) {
            let model = model.trim();
            self.workspace.segmentation_model = (!model.is_empty()).then(|| model.to_string());
        }
    }

    /// Build from defaults plus a variable lookup, then validate.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();
        config.apply_lookup(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Load the config file (if any) and apply the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::load_from_default_path().unwrap_or_default();
        config.apply_lookup(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Check that the workspace is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workspace.top_work_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingVariable(ENV_TOP_WORK_DIR));
        }
        if self.workspace.workset.is_empty() {
            return Err(ConfigError::MissingVariable(ENV_WORKSET));
        }
        if self.workspace.accepted.is_empty() {
            return Err(ConfigError::MissingVariable(ENV_ACCEPTED));
        }
        if self.brush.min_size == 0 || self.brush.min_size > self.brush.max_size {
            return Err(ConfigError::Invalid(format!(
                "brush range {}..{} is empty",
                self.brush.min_size, self.brush.max_size
            )));
        }
        Ok(())
    }

    /// Get the default filename for the config file.
    pub fn default_filename() -> &'static str {
        "maskpaint-config.json"
    }

    /// Get the default config file path.
    pub fn default_path() -> Option<PathBuf> {
        // Try to use XDG config directory, fall back to home directory
        if let Some(config_dir) = dirs::config_dir() {
            Some(config_dir.join("maskpaint").join(Self::default_filename()))
        } else {
            dirs::home_dir().map(|home_dir| {
                home_dir
                    .join(".config")
                    .join("maskpaint")
                    .join(Self::default_filename())
            })
        }
    }

    /// Try to load configuration from the default path.
    /// Returns None if the file doesn't exist or can't be read.
    pub fn load_from_default_path() -> Option<Self> {
        let path = Self::default_path()?;
        Self::load_from_path(&path)
    }

    /// Try to load configuration from a file, logging why it could not be used.
    pub fn load_from_path(path: &Path) -> Option<Self> {
        if !path.exists() {
            log::debug!("No config file found at {:?}", path);
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(json) => match Self::from_json(&json) {
                Ok(config) => {
                    log::info!("Loaded configuration from {:?}", path);
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse config file {:?}: {}", path, e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read config file {:?}: {}", path, e);
                None
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Expand a leading `~` to the home directory.
fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => match dirs::home_dir() {
            Some(home) => home.join(rest.trim_start_matches('/')),
            None => PathBuf::from(path),
        },
        _ => PathBuf::from(path),
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Configuration version is newer than supported
    #[error(
        "Configuration file version {file_version} is newer than supported version {supported_version}"
    )]
    VersionTooNew {
        file_version: u32,
        supported_version: u32,
    },

    /// Required setting is neither in the config file nor the environment
    #[error("{0} is not set")]
    MissingVariable(&'static str),

    /// Setting has an unusable value
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_from_lookup() {
        let config = AppConfig::from_lookup(lookup(&[
            ("TOP_WORK_DIR", "/data/work"),
            ("WORKSET", "set1"),
            ("ACCEPTED", "done"),
            ("SEGMENTATION_MODEL", "/models/seg.pt"),
        ]))
        .unwrap();

        assert_eq!(config.workspace.top_work_dir, PathBuf::from("/data/work"));
        assert_eq!(config.workspace.workset, "set1");
        assert_eq!(config.workspace.accepted, "done");
        assert_eq!(
            config.workspace.segmentation_model.as_deref(),
            Some("/models/seg.pt")
        );
    }

    #[test]
    fn test_empty_model_means_none() {
        let config = AppConfig::from_lookup(lookup(&[
            ("TOP_WORK_DIR", "/data"),
            ("SEGMENTATION_MODEL", ""),
        ]))
        .unwrap();
        assert!(config.workspace.segmentation_model.is_none());
    }

    #[test]
    fn test_missing_top_dir() {
        let result = AppConfig::from_lookup(lookup(&[]));
        assert!(matches!(
            result,
            Err(ConfigError::MissingVariable("TOP_WORK_DIR"))
        ));
    }

    #[test]
    fn test_json_roundtrip_keeps_brush() {
        let mut config = AppConfig::new();
        config.brush.default_size = 12;
        config.preferences.log_level = LogLevel::Debug;
        let parsed = AppConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed.brush.default_size, 12);
        assert_eq!(parsed.brush.max_size, MAX_BRUSH_SIZE);
        assert_eq!(parsed.preferences.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = AppConfig::from_json(r#"{"version": 1}"#).unwrap();
        assert_eq!(config.layers.label_opacity, DEFAULT_LABEL_OPACITY);
        assert_eq!(config.workspace.workset, "workset");
    }

    #[test]
    fn test_version_too_new() {
        let result = AppConfig::from_json(r#"{"version": 99}"#);
        assert!(matches!(result, Err(ConfigError::VersionTooNew { .. })));
    }

    #[test]
    fn test_invalid_brush_range() {
        let mut config = AppConfig::from_lookup(lookup(&[("TOP_WORK_DIR", "/data")])).unwrap();
        config.brush.min_size = 20;
        config.brush.max_size = 10;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        assert_eq!(expand_home("~user/x"), PathBuf::from("~user/x"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/work"), home.join("work"));
        }
    }
}
