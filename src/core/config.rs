use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;

use super::alerts::model::AlertSettings;
use super::alerts::state::StoreConfig;

/// Application settings with alert configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Settings {
    /// JSON feed of normalized alerts written by the provider adapter
    pub feed_path: PathBuf,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Notification policy
    #[serde(default)]
    pub alert_settings: AlertSettings,
    /// Alert state retention
    #[serde(default)]
    pub store: StoreConfig,
}

fn default_poll_interval() -> u64 {
    300
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            feed_path: PathBuf::from("alerts.json"),
            poll_interval_seconds: default_poll_interval(),
            alert_settings: AlertSettings::default(),
            store: StoreConfig::default(),
        }
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(app_config_dir: PathBuf) -> Self {
        Self {
            config_path: app_config_dir.join("settings.json"),
        }
    }

    /// Load settings, falling back to defaults when the file is missing,
    /// unreadable, or fails validation.
    pub fn load(&self) -> Settings {
        if !self.config_path.exists() {
            return Settings::default();
        }
        let content = match fs::read_to_string(&self.config_path) {
            Ok(content) => content,
            Err(e) => {
                log::warn!("Could not read {:?}: {}", self.config_path, e);
                return Settings::default();
            }
        };
        let settings: Settings = match serde_json::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Could not parse {:?}: {}", self.config_path, e);
                return Settings::default();
            }
        };
        if let Err(e) = settings.alert_settings.validate() {
            log::warn!("Invalid alert settings in {:?}: {}", self.config_path, e);
            return Settings::default();
        }
        settings
    }

    pub fn save(&self, settings: &Settings) -> io::Result<()> {
        // Ensure directory exists
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.config_path, content)
    }
}
