// SPDX-License-Identifier: GPL-3.0-only

//! Persistent settings
//!
//! Stored as JSON in `$XDG_CONFIG_HOME/cardscan/config.json`. A missing,
//! unreadable or outdated file falls back to defaults; fields missing from
//! an older file take their default values.

use crate::backends::camera::PreviewSize;
use crate::constants::{self, app_info};
use crate::control::{ControllerOptions, FocusTimings, ShakeConfig};
use crate::pipeline::WorkerOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Current config layout
pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: u32,
    /// Preview width requested from the camera
    pub preview_width: u32,
    /// Preview height requested from the camera
    pub preview_height: u32,
    /// Buffers in the frame pool shared by camera and worker
    pub callback_buffers: usize,
    pub focus: FocusTimings,
    pub shake: ShakeConfig,
    /// Log processed/dropped frame rates
    pub report_fps: bool,
    /// JPEG quality of the returned card image (1-100)
    pub jpeg_quality: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            preview_width: constants::camera::PREVIEW_WIDTH,
            preview_height: constants::camera::PREVIEW_HEIGHT,
            callback_buffers: constants::camera::CALLBACK_BUFFERS,
            focus: FocusTimings::default(),
            shake: ShakeConfig::default(),
            report_fps: false,
            jpeg_quality: constants::output::JPEG_QUALITY,
        }
    }
}

impl Config {
    /// `$XDG_CONFIG_HOME/cardscan/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(app_info::APP_NAME).join("config.json"))
    }

    /// Load from the default location, defaults on any problem
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                warn!("No config directory, using defaults");
                Self::default()
            }
        }
    }

    /// Load from `path`, defaults on any problem
    pub fn load_from(path: &Path) -> Self {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read config, using defaults");
                return Self::default();
            }
        };

        match serde_json::from_str::<Config>(&contents) {
            Ok(config) if config.version > CONFIG_VERSION => {
                warn!(
                    version = config.version,
                    supported = CONFIG_VERSION,
                    "Config written by a newer version, using defaults"
                );
                Self::default()
            }
            Ok(mut config) => {
                config.version = CONFIG_VERSION;
                config.sanitize();
                info!(path = %path.display(), "Loaded config");
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Invalid config, using defaults");
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(path, json)?;
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }

    pub fn save(&self) -> io::Result<()> {
        let path = Self::default_path()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no config directory"))?;
        self.save_to(&path)
    }

    /// Clamp values the pipeline cannot work with
    fn sanitize(&mut self) {
        if self.callback_buffers < constants::camera::MIN_CALLBACK_BUFFERS {
            warn!(
                callback_buffers = self.callback_buffers,
                "Too few callback buffers, raising to minimum"
            );
            self.callback_buffers = constants::camera::MIN_CALLBACK_BUFFERS;
        }
        self.jpeg_quality = self.jpeg_quality.clamp(1, 100);
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            preview_size: PreviewSize::new(self.preview_width, self.preview_height),
            callback_buffers: self.callback_buffers,
            focus: self.focus,
            worker: WorkerOptions {
                report_fps: self.report_fps,
            },
        }
    }
}
