// Config module - loads `config.toml` from the platform config dir

mod settings;

pub use settings::{ColorToken, NodeColors, PluginSettings};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PluginError, Result};

const CONFIG_DIR: &str = "canvas-llm";
const MAIN_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub settings: PluginSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl AppConfig {
    /// Load config from a file path, falling back to defaults when it is missing
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| PluginError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        toml::from_str(&content)
            .map_err(|e| PluginError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| PluginError::Config(format!("Failed to create config dir: {}", e)))?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| PluginError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| PluginError::Config(format!("Failed to write {}: {}", path.display(), e)))?;

        Ok(())
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
    app_config: AppConfig,
}

impl ConfigManager {
    /// Load from the default location, `~/.config/canvas-llm/config.toml` on Linux
    pub fn new() -> Result<Self> {
        let config_dir = Self::get_config_dir()?;
        Self::from_path(config_dir.join(MAIN_CONFIG_FILE))
    }

    /// Load from an explicit file. A missing file yields defaults.
    pub fn from_path(config_path: PathBuf) -> Result<Self> {
        let app_config = AppConfig::load(&config_path)?;
        tracing::debug!(path = %config_path.display(), "Loaded config");

        Ok(Self {
            config_path,
            app_config,
        })
    }

    /// Like [`ConfigManager::from_path`] but the file must exist
    pub fn from_existing_path(config_path: PathBuf) -> Result<Self> {
        if !config_path.exists() {
            return Err(PluginError::ConfigNotFound { path: config_path });
        }
        Self::from_path(config_path)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn app_config(&self) -> &AppConfig {
        &self.app_config
    }

    pub fn app_config_mut(&mut self) -> &mut AppConfig {
        &mut self.app_config
    }

    pub fn settings(&self) -> &PluginSettings {
        &self.app_config.settings
    }

    pub fn save(&self) -> Result<()> {
        self.app_config.save(&self.config_path)
    }

    pub fn reload(&mut self) -> Result<()> {
        self.app_config = AppConfig::load(&self.config_path)?;
        Ok(())
    }

    /// Write the default config if none exists yet
    pub fn write_default_config(&self) -> Result<()> {
        if self.config_path.exists() {
            return Ok(());
        }
        AppConfig::default().save(&self.config_path)
    }

    fn get_config_dir() -> Result<PathBuf> {
        BaseDirs::new()
            .map(|dirs| dirs.config_dir().join(CONFIG_DIR))
            .ok_or_else(|| PluginError::Config("Could not determine config directory".to_string()))
    }
}
