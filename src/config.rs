// SPDX-License-Identifier: GPL-3.0-only

//! User configuration
//!
//! Stored as pretty-printed JSON in `<config dir>/fieldcam/config.json`.
//! A missing file is created with defaults on first load.

use crate::backends::camera::session::SessionConfig;
use crate::backends::camera::types::{CameraPosition, PhotoOutputConfig};
use crate::constants::*;
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Config schema version
    pub version: u32,
    /// Document database location (default: `<data dir>/fieldcam/documents.db`)
    pub database_path: Option<PathBuf>,
    /// JPEG quality for the still output (1-100)
    pub jpeg_quality: u8,
    /// Requested still resolution
    pub capture_width: u32,
    pub capture_height: u32,
    /// Which camera the session opens
    pub camera_position: CameraPosition,
    /// Wait for a location fix, in milliseconds
    pub location_timeout_ms: u64,
    /// Log filter used when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            database_path: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            capture_width: DEFAULT_CAPTURE_WIDTH,
            capture_height: DEFAULT_CAPTURE_HEIGHT,
            camera_position: CameraPosition::Back,
            location_timeout_ms: DEFAULT_LOCATION_TIMEOUT.as_millis() as u64,
            log_level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Load configuration from the default location
    pub fn load() -> AppResult<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from `path`, writing defaults if it does not exist
    pub fn load_from(path: &Path) -> AppResult<Self> {
        if path.exists() {
            info!(path = %path.display(), "Loading config");
            let json = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&json)
                .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
            if config.version > CONFIG_VERSION {
                warn!(
                    found = config.version,
                    supported = CONFIG_VERSION,
                    "Config written by a newer version"
                );
            }
            Ok(config)
        } else {
            warn!(path = %path.display(), "No config found, creating default");
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> AppResult<()> {
        self.save_to(&Self::default_path())
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Resolved database path
    pub fn database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR_NAME)
                .join(DATABASE_FILE_NAME)
        })
    }

    pub fn location_timeout(&self) -> Duration {
        Duration::from_millis(self.location_timeout_ms)
    }

    /// Capture session parameters derived from this config
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            position: self.camera_position,
            output: PhotoOutputConfig {
                width: self.capture_width,
                height: self.capture_height,
                jpeg_quality: self.jpeg_quality.clamp(1, 100),
            },
        }
    }
}
