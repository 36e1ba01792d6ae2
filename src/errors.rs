// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the inspection station core
//!
//! Device errors raised while the acquisition loop is ticking never reach these
//! outer layers; the loop turns them into connection state. Everything a caller
//! triggers explicitly (opening a device, applying a setting, capturing a sample)
//! reports back through the types below.

use std::fmt;
use std::path::PathBuf;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Camera device errors
    Camera(CameraError),
    /// Settings application errors
    Settings(SettingsError),
    /// Sample capture errors
    Capture(CaptureError),
    /// Configuration errors
    Config(ConfigError),
}

/// Camera device errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    /// Device index does not exist or is held by another handle
    DeviceUnavailable(String),
    /// Requested resolution or frame rate rejected by the device
    UnsupportedMode(String),
    /// Mode cannot change on a live stream; close and reopen instead
    RequiresReopen,
    /// No frame arrived within the bounded wait
    CaptureTimeout,
    /// Device handle became invalid (unplugged)
    DeviceDisconnected,
    /// Operation needs an open backend
    NotOpen,
}

impl CameraError {
    /// Transient errors are retried on the next tick
    pub fn is_transient(&self) -> bool {
        matches!(self, CameraError::CaptureTimeout)
    }
}

/// Dataset storage errors
#[derive(Debug, Clone)]
pub enum StorageError {
    /// Category directory could not be created
    CreateDir { path: PathBuf, reason: String },
    /// Frame could not be encoded as JPEG
    Encode(String),
    /// Writing the sample file failed (disk full, permissions)
    Write { path: PathBuf, reason: String },
}

/// Settings application errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// Value is outside the supported set
    InvalidValue(String),
    /// Backend swap failed; the configuration was reverted
    Swap {
        cause: CameraError,
        /// True when the last-known-good configuration was reopened
        restored: bool,
    },
    /// In-place control call failed
    Control(CameraError),
}

/// Sample capture errors
#[derive(Debug, Clone)]
pub enum CaptureError {
    /// No frame has been acquired yet
    NoFrameAvailable,
    /// Camera connection is lost; the last frame is stale
    Disconnected,
    /// Persisting the sample failed
    Storage(StorageError),
}

/// Configuration file errors
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// Reading or writing the config file failed
    Io(String),
    /// Config file contents are invalid
    Parse(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Camera(e) => write!(f, "Camera error: {}", e),
            AppError::Settings(e) => write!(f, "Settings error: {}", e),
            AppError::Capture(e) => write!(f, "Capture error: {}", e),
            AppError::Config(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::DeviceUnavailable(msg) => write!(f, "Device unavailable: {}", msg),
            CameraError::UnsupportedMode(msg) => write!(f, "Unsupported mode: {}", msg),
            CameraError::RequiresReopen => write!(f, "Mode change requires reopening the device"),
            CameraError::CaptureTimeout => write!(f, "Timed out waiting for a frame"),
            CameraError::DeviceDisconnected => write!(f, "Camera disconnected"),
            CameraError::NotOpen => write!(f, "Camera is not open"),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::CreateDir { path, reason } => {
                write!(f, "Failed to create {}: {}", path.display(), reason)
            }
            StorageError::Encode(msg) => write!(f, "JPEG encoding failed: {}", msg),
            StorageError::Write { path, reason } => {
                write!(f, "Failed to write {}: {}", path.display(), reason)
            }
        }
    }
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::InvalidValue(msg) => write!(f, "Invalid value: {}", msg),
            SettingsError::Swap { cause, restored } => {
                if *restored {
                    write!(f, "Could not apply camera change ({}); previous settings restored", cause)
                } else {
                    write!(f, "Could not apply camera change ({}); camera is closed", cause)
                }
            }
            SettingsError::Control(e) => write!(f, "Control failed: {}", e),
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::NoFrameAvailable => write!(f, "No frame available for capture"),
            CaptureError::Disconnected => write!(f, "Camera disconnected, nothing to capture"),
            CaptureError::Storage(e) => write!(f, "{}", e),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "I/O error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for CameraError {}
impl std::error::Error for StorageError {}
impl std::error::Error for SettingsError {}
impl std::error::Error for CaptureError {}
impl std::error::Error for ConfigError {}

// Conversions from sub-errors to AppError
impl From<CameraError> for AppError {
    fn from(err: CameraError) -> Self {
        AppError::Camera(err)
    }
}

impl From<SettingsError> for AppError {
    fn from(err: SettingsError) -> Self {
        AppError::Settings(err)
    }
}

impl From<CaptureError> for AppError {
    fn from(err: CaptureError) -> Self {
        AppError::Capture(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<StorageError> for CaptureError {
    fn from(err: StorageError) -> Self {
        CaptureError::Storage(err)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Capture(CaptureError::Storage(err))
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}
