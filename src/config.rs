use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::layout::{GridLayout, DEFAULT_SCAN_MARGIN};
use crate::pipeline::{
    Limits, DEFAULT_LOCAL_ROW_CEILING, DEFAULT_REMOTE_ROW_THRESHOLD, DEFAULT_SERIES_ITEM_CEILING,
};

/// Manages config directory and config file operations
#[derive(Clone)]
pub struct ConfigManager {
    pub(crate) config_dir: PathBuf,
}

impl ConfigManager {
    /// Create a ConfigManager with a custom config directory (primarily for testing)
    pub fn with_dir(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    /// Create a new ConfigManager for the given app name
    pub fn new(app_name: &str) -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| eyre!("Could not determine config directory"))?
            .join(app_name);

        Ok(Self { config_dir })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Get path to a specific config file or subdirectory
    pub fn config_path(&self, path: &str) -> PathBuf {
        self.config_dir.join(path)
    }

    pub fn ensure_config_dir(&self) -> Result<()> {
        if !self.config_dir.exists() {
            std::fs::create_dir_all(&self.config_dir)?;
        }
        Ok(())
    }

    /// Generate default configuration template as a string
    pub fn generate_default_config(&self) -> String {
        DEFAULT_CONFIG_TEMPLATE.to_string()
    }

    /// Write default configuration to config file
    pub fn write_default_config(&self, force: bool) -> Result<PathBuf> {
        let config_path = self.config_path("config.toml");

        if config_path.exists() && !force {
            return Err(eyre!(
                "Config file already exists at {}. Use --force to overwrite.",
                config_path.display()
            ));
        }

        self.ensure_config_dir()?;
        std::fs::write(&config_path, DEFAULT_CONFIG_TEMPLATE)?;

        Ok(config_path)
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Configuration format version (for future compatibility)
    pub version: String,
    pub pipeline: PipelineConfig,
    pub layout: LayoutConfig,
    pub autosave: AutosaveConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub local_row_ceiling: usize,
    pub series_item_ceiling: usize,
    pub remote_row_threshold: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub scan_margin: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: "0.1".to_string(),
            pipeline: PipelineConfig::default(),
            layout: LayoutConfig::default(),
            autosave: AutosaveConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            local_row_ceiling: DEFAULT_LOCAL_ROW_CEILING,
            series_item_ceiling: DEFAULT_SERIES_ITEM_CEILING,
            remote_row_threshold: DEFAULT_REMOTE_ROW_THRESHOLD,
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            scan_margin: DEFAULT_SCAN_MARGIN,
        }
    }
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self { debounce_ms: 800 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

// Configuration loading and merging
impl AppConfig {
    /// Load configuration from all layers (default → user)
    pub fn load(app_name: &str) -> Result<Self> {
        let manager = ConfigManager::new(app_name)?;
        Self::load_from(&manager)
    }

    /// Load using an explicit config directory.
    pub fn load_from(manager: &ConfigManager) -> Result<Self> {
        let mut config = AppConfig::default();

        match Self::load_user_config(manager) {
            Ok(user_config) => config.merge(user_config),
            Err(e) => warn!(error = %e, "ignoring unreadable user config"),
        }

        config.validate()?;

        Ok(config)
    }

    /// Load user configuration from ~/.config/dashcore/config.toml
    fn load_user_config(manager: &ConfigManager) -> Result<AppConfig> {
        let config_path = manager.config_path("config.toml");

        if !config_path.exists() {
            return Ok(AppConfig::default());
        }

        let content = std::fs::read_to_string(&config_path).map_err(|e| {
            eyre!(
                "Failed to read config file at {}: {}",
                config_path.display(),
                e
            )
        })?;

        toml::from_str(&content).map_err(|e| {
            eyre!(
                "Failed to parse config file at {}: {}",
                config_path.display(),
                e
            )
        })
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: AppConfig) {
        if other.version != AppConfig::default().version {
            self.version = other.version;
        }

        self.pipeline.merge(other.pipeline);
        self.layout.merge(other.layout);
        self.autosave.merge(other.autosave);
        self.logging.merge(other.logging);
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.version.starts_with("0.1") {
            return Err(eyre!(
                "Unsupported config version: {}. Expected 0.1.x",
                self.version
            ));
        }

        if self.pipeline.local_row_ceiling == 0 {
            return Err(eyre!("local_row_ceiling must be greater than 0"));
        }
        if self.pipeline.series_item_ceiling == 0 {
            return Err(eyre!("series_item_ceiling must be greater than 0"));
        }
        if self.pipeline.remote_row_threshold == 0 {
            return Err(eyre!("remote_row_threshold must be greater than 0"));
        }

        if self.logging.filter.trim().is_empty() {
            return Err(eyre!("logging.filter must not be empty"));
        }

        Ok(())
    }

    pub fn limits(&self) -> Limits {
        Limits {
            local_row_ceiling: self.pipeline.local_row_ceiling,
            series_item_ceiling: self.pipeline.series_item_ceiling,
            remote_row_threshold: self.pipeline.remote_row_threshold,
        }
    }

    pub fn grid_layout(&self) -> GridLayout {
        GridLayout::new(self.layout.scan_margin)
    }

    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave.debounce_ms)
    }
}

impl PipelineConfig {
    pub fn merge(&mut self, other: Self) {
        let default = PipelineConfig::default();
        if other.local_row_ceiling != default.local_row_ceiling {
            self.local_row_ceiling = other.local_row_ceiling;
        }
        if other.series_item_ceiling != default.series_item_ceiling {
            self.series_item_ceiling = other.series_item_ceiling;
        }
        if other.remote_row_threshold != default.remote_row_threshold {
            self.remote_row_threshold = other.remote_row_threshold;
        }
    }
}

impl LayoutConfig {
    pub fn merge(&mut self, other: Self) {
        if other.scan_margin != LayoutConfig::default().scan_margin {
            self.scan_margin = other.scan_margin;
        }
    }
}

impl AutosaveConfig {
    pub fn merge(&mut self, other: Self) {
        if other.debounce_ms != AutosaveConfig::default().debounce_ms {
            self.debounce_ms = other.debounce_ms;
        }
    }
}

impl LoggingConfig {
    pub fn merge(&mut self, other: Self) {
        if other.filter != LoggingConfig::default().filter {
            self.filter = other.filter;
        }
    }
}

// Default configuration template
const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("../config/default.toml");
