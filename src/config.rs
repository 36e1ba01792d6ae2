// SPDX-License-Identifier: GPL-3.0-only

//! Station configuration
//!
//! Stored as pretty-printed JSON under the platform config directory. Missing
//! fields fall back to their defaults so older files keep loading.

use crate::backends::camera::CameraConfig;
use crate::constants::{config, dataset};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Camera used at start-up
    pub camera: CameraConfig,
    /// Dataset root holding the `ok` and `not_ok` directories
    pub storage_root: PathBuf,
    /// JPEG quality for stored samples (1-100)
    pub jpeg_quality: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            storage_root: PathBuf::from(dataset::DEFAULT_STORAGE_ROOT),
            jpeg_quality: dataset::DEFAULT_JPEG_QUALITY,
        }
    }
}

impl Config {
    /// `<config dir>/inspection-station/config.json`, if the platform has one
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(config::APP_DIR).join(config::FILE_NAME))
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let config: Config = serde_json::from_str(&text)?;
        info!(path = %path.display(), camera = %config.camera, "Loaded configuration");
        Ok(config)
    }

    /// Write to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }
}
