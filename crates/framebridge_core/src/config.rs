//! # Configuration
//!
//! Loaded once at startup from TOML. Every field has a default, so an empty
//! file (or no file) is a valid configuration.
//!
//! ```toml
//! [window]
//! title = "framebridge"
//! width = 1280
//! height = 720
//!
//! [timing]
//! max_frame_delta = 0.033
//!
//! [render]
//! clear_color = [0.0, 0.0, 0.0, 1.0]
//! vsync = true
//! power_preference = "high-performance"
//!
//! [engine]
//! initial_pages = 2
//! maximum_pages = 16384
//!
//! [log]
//! filter = "info"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FrameBridgeConfig {
    /// Window settings.
    pub window: WindowConfig,
    /// Host-loop timing.
    pub timing: TimingConfig,
    /// GPU presentation.
    pub render: RenderConfig,
    /// Reference engine memory limits.
    pub engine: EngineConfig,
    /// Logging.
    pub log: LogConfig,
}

/// Window settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    /// Window title.
    pub title: String,
    /// Initial inner width in logical pixels.
    pub width: u32,
    /// Initial inner height in logical pixels.
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "framebridge".to_owned(),
            width: 1280,
            height: 720,
        }
    }
}

/// Host-loop timing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingConfig {
    /// Upper bound on the simulation step, in seconds.
    pub max_frame_delta: f32,
}

impl TimingConfig {
    /// Largest accepted `max_frame_delta`, in seconds.
    pub const MAX_FRAME_DELTA_LIMIT: f32 = 1.0;

    /// `max_frame_delta` as a duration.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if the value is not a positive number of
    /// seconds no larger than [`Self::MAX_FRAME_DELTA_LIMIT`].
    pub fn max_delta(&self) -> Result<Duration, ConfigError> {
        let dt = self.max_frame_delta;
        if dt.is_nan() || dt <= 0.0 || dt > Self::MAX_FRAME_DELTA_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "timing.max_frame_delta must be in (0, {}] seconds, got {dt}",
                Self::MAX_FRAME_DELTA_LIMIT
            )));
        }
        Duration::try_from_secs_f32(dt)
            .map_err(|err| ConfigError::Invalid(format!("timing.max_frame_delta {dt}: {err}")))
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self { max_frame_delta: 0.033 }
    }
}

/// GPU power preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PowerPreference {
    /// Prefer an integrated GPU.
    LowPower,
    /// Prefer a discrete GPU.
    #[default]
    HighPerformance,
}

/// GPU presentation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// RGBA clear color, each channel in `[0, 1]`.
    pub clear_color: [f64; 4],
    /// Wait for vertical blank when presenting.
    pub vsync: bool,
    /// Adapter selection.
    pub power_preference: PowerPreference,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            vsync: true,
            power_preference: PowerPreference::HighPerformance,
        }
    }
}

/// Reference engine memory limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Pages at startup.
    pub initial_pages: u32,
    /// Growth limit in pages.
    pub maximum_pages: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_pages: 2,
            // 1 GiB
            maximum_pages: 16_384,
        }
    }
}

/// Logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// `tracing` filter directive, overridden by `RUST_LOG`.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
        }
    }
}

impl FrameBridgeConfig {
    /// Reads and validates a TOML file.
    ///
    /// # Errors
    ///
    /// I/O, parse, or validation failures.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// Parse or validation failures.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size {}x{} has a zero dimension",
                self.window.width, self.window.height
            )));
        }
        self.timing.max_delta()?;
        if let Some(channel) = self.render.clear_color.iter().find(|c| !(0.0..=1.0).contains(*c)) {
            return Err(ConfigError::Invalid(format!(
                "render.clear_color channel {channel} is outside [0, 1]"
            )));
        }
        if self.engine.initial_pages == 0 {
            return Err(ConfigError::Invalid("engine.initial_pages must be at least 1".to_owned()));
        }
        if self.engine.maximum_pages < self.engine.initial_pages {
            return Err(ConfigError::Invalid(format!(
                "engine.maximum_pages ({}) is below engine.initial_pages ({})",
                self.engine.maximum_pages, self.engine.initial_pages
            )));
        }
        Ok(())
    }
}
