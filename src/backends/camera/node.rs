// SPDX-License-Identifier: GPL-3.0-only

//! Native device surface shared by both camera backends
//!
//! A [`DeviceSource`] enumerates and opens devices of one kind; the resulting
//! [`VideoNode`] is the raw handle a backend drives. The V4L2 implementation talks
//! to real hardware, the simulated one backs tests and the `--simulate` CLI flag.

use super::types::{CameraKind, DeviceDescriptor, Frame};
use crate::constants::focus;
use std::fmt;
use std::time::Duration;

/// Hardware controls the backends map onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    /// Continuous autofocus on/off
    FocusAuto,
    /// Lens position
    FocusAbsolute,
    /// Auto exposure mode (menu)
    ExposureAuto,
}

/// Range reported for an integer control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRange {
    pub minimum: i32,
    pub maximum: i32,
    pub step: i32,
    pub default_value: i32,
}

impl ControlRange {
    /// Map a 0-255 slider value onto this range, snapped to the step
    pub fn scale_from_u8(&self, value: u8) -> i32 {
        let span = (self.maximum - self.minimum) as f64;
        let raw = self.minimum as f64 + span * value as f64 / f64::from(focus::MANUAL_FOCUS_MAX);
        let step = self.step.max(1) as f64;
        let snapped = self.minimum as f64 + ((raw - self.minimum as f64) / step).round() * step;
        (snapped as i32).clamp(self.minimum, self.maximum)
    }
}

/// Stream mode requested from or reported by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamMode {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} @ {}fps", self.width, self.height, self.fps)
    }
}

/// Errors from the native device layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// No device at this index or path
    NotFound(String),
    /// Device held elsewhere, or busy streaming
    Busy(String),
    /// Device rejected the request
    Rejected(String),
    /// No frame within the wait
    Timeout,
    /// Frame arrived but could not be decoded
    Corrupt(String),
    /// Device handle is gone
    Disconnected,
    /// Anything else the driver reported
    Io(String),
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::NotFound(msg) => write!(f, "not found: {}", msg),
            NodeError::Busy(msg) => write!(f, "busy: {}", msg),
            NodeError::Rejected(msg) => write!(f, "rejected: {}", msg),
            NodeError::Timeout => write!(f, "timed out"),
            NodeError::Corrupt(msg) => write!(f, "corrupt frame: {}", msg),
            NodeError::Disconnected => write!(f, "disconnected"),
            NodeError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for NodeError {}

/// One opened device
pub trait VideoNode: Send {
    /// Descriptor this node was opened from
    fn descriptor(&self) -> &DeviceDescriptor;

    /// Negotiate a mode and start streaming
    ///
    /// Returns the mode the device actually runs, which may differ from the request.
    fn start(&mut self, mode: StreamMode) -> Result<StreamMode, NodeError>;

    /// Stop streaming and release buffers
    fn stop(&mut self) -> Result<(), NodeError>;

    /// Wait up to `timeout` for the next frame
    fn next_frame(&mut self, timeout: Duration) -> Result<Frame, NodeError>;

    /// Range of a control, `None` when the device does not expose it
    fn control_range(&self, control: Control) -> Option<ControlRange>;

    /// Current control value
    fn get_control(&self, control: Control) -> Option<i32>;

    /// Write a control value
    fn set_control(&mut self, control: Control, value: i32) -> Result<(), NodeError>;

    /// Change the frame size on a live stream
    ///
    /// Fails with `Busy` when the device needs a stream restart.
    fn set_live_resolution(&mut self, width: u32, height: u32) -> Result<(), NodeError>;

    /// Change the frame rate on a live stream, returning the applied rate
    fn set_live_fps(&mut self, fps: u32) -> Result<u32, NodeError>;
}

/// Enumerates and opens devices of one kind
pub trait DeviceSource: Send + Sync {
    /// Kind of device this source serves
    fn kind(&self) -> CameraKind;

    /// Currently attachable devices; no side effects
    fn enumerate(&self) -> Vec<DeviceDescriptor>;

    /// Acquire exclusive access to a device
    fn open(&self, index: u32) -> Result<Box<dyn VideoNode>, NodeError>;
}
