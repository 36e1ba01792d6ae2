// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use crate::constants::{depth, focus, formats};
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// A single frame from the camera
///
/// Pixel data lives in a shared immutable buffer, so handing the same frame to
/// several consumers never copies pixels and nobody can mutate it after capture.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// 3 for packed RGB, 1 for grayscale
    pub channels: u8,
    pub data: Arc<[u8]>,
    /// Timestamp when the frame was captured
    pub captured_at: Instant,
    /// Per-backend frame counter, starting at 1
    pub sequence: u64,
}

impl Frame {
    /// Create a frame stamped with the current instant
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Self {
        debug_assert_eq!(
            data.len(),
            width as usize * height as usize * channels as usize,
            "frame buffer size does not match its dimensions"
        );
        Self {
            width,
            height,
            channels,
            data: Arc::from(data.into_boxed_slice()),
            captured_at: Instant::now(),
            sequence: 0,
        }
    }

    /// Set the frame sequence number
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Scaled-down copy whose longest edge is at most `max_edge`, aspect kept
    ///
    /// Frames already within the bound are returned as a cheap clone.
    pub fn downscaled(&self, max_edge: u32) -> Frame {
        if self.width <= max_edge && self.height <= max_edge {
            return self.clone();
        }

        let scale = max_edge as f64 / self.width.max(self.height) as f64;
        let width = ((self.width as f64 * scale).round() as u32).max(1);
        let height = ((self.height as f64 * scale).round() as u32).max(1);

        let data = match self.channels {
            1 => GrayImage::from_raw(self.width, self.height, self.data.to_vec())
                .map(|img| imageops::resize(&img, width, height, FilterType::Triangle).into_raw()),
            _ => RgbImage::from_raw(self.width, self.height, self.data.to_vec())
                .map(|img| imageops::resize(&img, width, height, FilterType::Triangle).into_raw()),
        };

        match data {
            Some(data) => Frame {
                width,
                height,
                channels: self.channels,
                data: Arc::from(data.into_boxed_slice()),
                captured_at: self.captured_at,
                sequence: self.sequence,
            },
            // Buffer did not match the dimensions; keep the original
            None => self.clone(),
        }
    }
}

/// Camera device kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraKind {
    /// Generic UVC webcam
    #[default]
    Usb,
    /// Structured-light depth camera (color stream)
    Depth,
}

impl CameraKind {
    pub const ALL: [CameraKind; 2] = [CameraKind::Usb, CameraKind::Depth];
}

impl std::fmt::Display for CameraKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraKind::Usb => write!(f, "USB webcam"),
            CameraKind::Depth => write!(f, "depth camera"),
        }
    }
}

impl std::str::FromStr for CameraKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "usb" | "usb-standard" | "webcam" => Ok(CameraKind::Usb),
            "depth" | "intel-realsense" | "realsense" => Ok(CameraKind::Depth),
            other => Err(format!("unknown camera kind '{}'", other)),
        }
    }
}

/// Capture resolution, limited to the modes the station offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Resolution {
    /// 640x480
    #[serde(rename = "640x480")]
    Vga,
    /// 1280x720
    #[default]
    #[serde(rename = "1280x720")]
    Hd,
    /// 1920x1080
    #[serde(rename = "1920x1080")]
    FullHd,
}

impl Resolution {
    /// Highest first, matching the settings drop-down
    pub const ALL: [Resolution; 3] = [Resolution::FullHd, Resolution::Hd, Resolution::Vga];

    pub fn width(&self) -> u32 {
        match self {
            Resolution::Vga => 640,
            Resolution::Hd => 1280,
            Resolution::FullHd => 1920,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Resolution::Vga => 480,
            Resolution::Hd => 720,
            Resolution::FullHd => 1080,
        }
    }

    /// Short label shown next to the dimensions
    pub fn label(&self) -> &'static str {
        match self {
            Resolution::Vga => "VGA",
            Resolution::Hd => "HD",
            Resolution::FullHd => "Full HD",
        }
    }

    /// Look up the enumerated mode for exact dimensions
    pub fn from_dimensions(width: u32, height: u32) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|r| r.width() == width && r.height() == height)
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width(), self.height())
    }
}

impl std::str::FromStr for Resolution {
    type Err = String;

    /// Accepts "1280x720" as well as the settings label "1280 x 720 (HD)"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dims = s.split('(').next().unwrap_or(s);
        let mut parts = dims.split(['x', 'X', '×']).map(str::trim);
        let width = parts.next().and_then(|w| w.parse::<u32>().ok());
        let height = parts.next().and_then(|h| h.parse::<u32>().ok());

        match (width, height) {
            (Some(w), Some(h)) => Self::from_dimensions(w, h)
                .ok_or_else(|| format!("resolution {}x{} is not supported", w, h)),
            _ => Err(format!("cannot parse resolution '{}'", s)),
        }
    }
}

/// Descriptor of an attachable device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Position within the devices of the same kind
    pub index: u32,
    pub kind: CameraKind,
    /// Human-readable name (V4L2 card)
    pub name: String,
    /// Device path (e.g., /dev/video0)
    pub path: String,
    /// Driver name (e.g., uvcvideo)
    pub driver: String,
}

impl std::fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} ({})", self.index, self.name, self.path)
    }
}

/// Camera configuration value object
///
/// `manual_focus` only reaches the device while `autofocus` is off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub kind: CameraKind,
    pub device_index: u32,
    pub resolution: Resolution,
    pub fps: u32,
    pub autofocus: bool,
    pub manual_focus: u8,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            kind: CameraKind::Usb,
            device_index: 0,
            resolution: Resolution::default(),
            fps: formats::DEFAULT_FPS,
            autofocus: false,
            manual_focus: focus::DEFAULT_MANUAL_FOCUS,
        }
    }
}

impl CameraConfig {
    /// Defaults for a camera of `kind`
    pub fn default_for(kind: CameraKind) -> Self {
        match kind {
            CameraKind::Usb => Self::default(),
            CameraKind::Depth => Self {
                kind,
                resolution: depth::DEFAULT_RESOLUTION,
                fps: depth::DEFAULT_FPS,
                ..Self::default()
            },
        }
    }

    /// True when switching from `self` to `other` needs a fresh backend
    pub fn needs_new_backend(&self, other: &CameraConfig) -> bool {
        self.kind != other.kind || self.device_index != other.device_index
    }

    /// True when the stream mode differs
    pub fn mode_differs(&self, other: &CameraConfig) -> bool {
        self.resolution != other.resolution || self.fps != other.fps
    }
}

impl std::fmt::Display for CameraConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} #{} {} @ {}fps",
            self.kind, self.device_index, self.resolution, self.fps
        )
    }
}

/// Connection state published by the acquisition loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No backend open
    #[default]
    Closed,
    /// Backend open and serving frames
    Connected,
    /// Device disconnected; consumers must show a placeholder
    Lost,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Closed => write!(f, "closed"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Lost => write!(f, "lost"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_parse_forms() {
        assert_eq!("1280x720".parse::<Resolution>(), Ok(Resolution::Hd));
        assert_eq!(
            "1920 x 1080 (Full HD)".parse::<Resolution>(),
            Ok(Resolution::FullHd)
        );
        assert!("800x600".parse::<Resolution>().is_err());
        assert!("garbage".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_resolution_serde_uses_dimensions() {
        let json = serde_json::to_string(&Resolution::Vga).unwrap();
        assert_eq!(json, "\"640x480\"");
        let back: Resolution = serde_json::from_str("\"1920x1080\"").unwrap();
        assert_eq!(back, Resolution::FullHd);
    }

    #[test]
    fn test_camera_kind_aliases() {
        assert_eq!("intel-realsense".parse::<CameraKind>(), Ok(CameraKind::Depth));
        assert_eq!("usb-standard".parse::<CameraKind>(), Ok(CameraKind::Usb));
    }

    #[test]
    fn test_config_defaults() {
        let config = CameraConfig::default();
        assert!(!config.autofocus);
        assert_eq!(config.manual_focus, 128);
        assert_eq!(config.fps, 30);
    }

    #[test]
    fn test_depth_defaults_to_vga() {
        let config = CameraConfig::default_for(CameraKind::Depth);
        assert_eq!(config.kind, CameraKind::Depth);
        assert_eq!(config.resolution, Resolution::Vga);
        assert_eq!(config.fps, 30);
        assert_eq!(CameraConfig::default_for(CameraKind::Usb), CameraConfig::default());
    }

    #[test]
    fn test_needs_new_backend() {
        let base = CameraConfig::default();
        let other_index = CameraConfig {
            device_index: 1,
            ..base
        };
        let other_res = CameraConfig {
            resolution: Resolution::FullHd,
            ..base
        };
        assert!(base.needs_new_backend(&other_index));
        assert!(!base.needs_new_backend(&other_res));
        assert!(base.mode_differs(&other_res));
    }

    #[test]
    fn test_downscale_keeps_aspect() {
        let frame = Frame::new(640, 480, 3, vec![10; 640 * 480 * 3]).with_sequence(7);
        let thumb = frame.downscaled(58);
        assert_eq!(thumb.width, 58);
        assert_eq!(thumb.height, 44);
        assert_eq!(thumb.sequence, 7);
        assert_eq!(thumb.data.len(), 58 * 44 * 3);
    }

    #[test]
    fn test_downscale_small_frame_is_shared() {
        let frame = Frame::new(4, 2, 1, vec![0; 8]);
        let thumb = frame.downscaled(58);
        assert!(Arc::ptr_eq(&frame.data, &thumb.data));
    }
}
