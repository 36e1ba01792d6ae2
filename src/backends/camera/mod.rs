// SPDX-License-Identifier: GPL-3.0-only

//! Camera backend abstraction
//!
//! Two device kinds sit behind one closed enum. Each variant owns at most one
//! open device session and maps the shared operations onto its own native
//! controls.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │   FrameAcquisitionLoop   │  ← Single owner, serializes ticks and swaps
//! └────────────┬─────────────┘
//!              │
//!              ▼
//! ┌──────────────────────────┐
//! │   CameraBackend (enum)   │  ← UsbWebcam | Depth
//! └────────────┬─────────────┘
//!              │
//!              ▼
//! ┌──────────────────────────┐
//! │ DeviceSource / VideoNode │  ← V4L2 hardware or simulated devices
//! └──────────────────────────┘
//! ```

pub mod depth;
pub mod format_converters;
pub mod frame_loop;
pub mod node;
pub mod session;
pub mod simulated;
pub mod types;
pub mod usb;
pub mod v4l2;
pub mod v4l2_controls;

pub use depth::DepthCameraBackend;
pub use frame_loop::{
    CaptureHold, FrameAcquisitionLoop, FrameConsumer, LoopStats, SubscriptionId, TickDriver,
    TickOutcome,
};
pub use node::{DeviceSource, VideoNode};
pub use simulated::{SimulatedDevice, SimulatedSource};
pub use types::*;
pub use usb::UsbWebcamBackend;

use crate::errors::CameraError;
use session::SessionSlot;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Device sources for both kinds
#[derive(Clone)]
pub struct DeviceSources {
    pub usb: Arc<dyn DeviceSource>,
    pub depth: Arc<dyn DeviceSource>,
}

impl DeviceSources {
    /// Real V4L2 hardware
    pub fn v4l2() -> Self {
        Self {
            usb: Arc::new(v4l2::V4l2Source::new(CameraKind::Usb)),
            depth: Arc::new(v4l2::V4l2Source::new(CameraKind::Depth)),
        }
    }

    /// Simulated devices
    pub fn simulated(usb: SimulatedSource, depth: SimulatedSource) -> Self {
        Self {
            usb: Arc::new(usb),
            depth: Arc::new(depth),
        }
    }

    pub fn for_kind(&self, kind: CameraKind) -> Arc<dyn DeviceSource> {
        match kind {
            CameraKind::Usb => Arc::clone(&self.usb),
            CameraKind::Depth => Arc::clone(&self.depth),
        }
    }
}

/// Camera backend, one variant per device kind
pub enum CameraBackend {
    UsbWebcam(UsbWebcamBackend),
    Depth(DepthCameraBackend),
}

impl fmt::Debug for CameraBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraBackend")
            .field("kind", &self.kind())
            .field("device", &self.current_device())
            .finish()
    }
}

impl CameraBackend {
    /// Unopened backend for the given kind
    pub fn new(kind: CameraKind, sources: &DeviceSources) -> Self {
        let source = sources.for_kind(kind);
        match kind {
            CameraKind::Usb => CameraBackend::UsbWebcam(UsbWebcamBackend::new(source)),
            CameraKind::Depth => CameraBackend::Depth(DepthCameraBackend::new(source)),
        }
    }

    /// Create a backend for `config` and open it
    pub fn open_with(config: &CameraConfig, sources: &DeviceSources) -> Result<Self, CameraError> {
        let mut backend = Self::new(config.kind, sources);
        backend.open(config.device_index, config.resolution, config.fps)?;
        info!(config = %config, "Camera backend ready");
        Ok(backend)
    }

    pub fn kind(&self) -> CameraKind {
        match self {
            CameraBackend::UsbWebcam(_) => CameraKind::Usb,
            CameraBackend::Depth(_) => CameraKind::Depth,
        }
    }

    fn slot(&self) -> &SessionSlot {
        match self {
            CameraBackend::UsbWebcam(b) => b.slot(),
            CameraBackend::Depth(b) => b.slot(),
        }
    }

    fn slot_mut(&mut self) -> &mut SessionSlot {
        match self {
            CameraBackend::UsbWebcam(b) => b.slot_mut(),
            CameraBackend::Depth(b) => b.slot_mut(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.slot().is_open()
    }

    /// Acquire exclusive access to a device and start streaming
    ///
    /// Fails with `DeviceUnavailable` for a missing or held device and with
    /// `UnsupportedMode` when the device negotiates a different mode.
    pub fn open(&mut self, index: u32, resolution: Resolution, fps: u32) -> Result<(), CameraError> {
        match self {
            CameraBackend::UsbWebcam(b) => b.open(index, resolution, fps),
            CameraBackend::Depth(b) => b.open(index, resolution, fps),
        }
    }

    pub fn close(&mut self) {
        self.slot_mut().close();
    }

    /// Next frame, waiting at most two frame intervals
    pub fn read_frame(&mut self) -> Result<Frame, CameraError> {
        self.slot_mut().read_frame()
    }

    /// Best-effort; `false` means unsupported, not failed
    pub fn set_autofocus(&mut self, enabled: bool) -> bool {
        match self {
            CameraBackend::UsbWebcam(b) => b.set_autofocus(enabled),
            CameraBackend::Depth(b) => b.set_autofocus(enabled),
        }
    }

    /// Best-effort; `false` when the device ignores or rejects the value
    pub fn set_manual_focus(&mut self, value: u8) -> bool {
        match self {
            CameraBackend::UsbWebcam(b) => b.set_manual_focus(value),
            CameraBackend::Depth(b) => b.set_manual_focus(value),
        }
    }

    /// Change resolution in place, or `RequiresReopen`
    pub fn set_resolution(&mut self, resolution: Resolution) -> Result<(), CameraError> {
        self.slot_mut().set_resolution(resolution)
    }

    /// Change frame rate in place, or `RequiresReopen`
    pub fn set_fps(&mut self, fps: u32) -> Result<(), CameraError> {
        self.slot_mut().set_fps(fps)
    }

    /// Attachable devices of this backend's kind
    pub fn list_devices(&self) -> Vec<DeviceDescriptor> {
        self.slot().list_devices()
    }

    pub fn current_device(&self) -> Option<&DeviceDescriptor> {
        self.slot().current_device()
    }
}
