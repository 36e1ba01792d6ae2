// SPDX-License-Identifier: GPL-3.0-only

//! Streaming session over one opened device node
//!
//! Both backend variants keep their device in a [`SessionSlot`]. The session
//! translates device-layer errors into [`CameraError`], numbers frames and
//! bounds every read.

use super::node::{Control, ControlRange, DeviceSource, NodeError, StreamMode, VideoNode};
use super::types::{DeviceDescriptor, Frame, Resolution};
use crate::constants::timing;
use crate::errors::CameraError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Longest wait for one frame: two nominal intervals, never below the floor
pub fn read_timeout(fps: u32) -> Duration {
    let interval = Duration::from_millis(1000 / u64::from(fps.max(1)));
    (interval * 2).max(timing::MIN_READ_TIMEOUT)
}

fn open_error(err: NodeError) -> CameraError {
    match err {
        NodeError::Rejected(msg) => CameraError::UnsupportedMode(msg),
        other => CameraError::DeviceUnavailable(other.to_string()),
    }
}

fn live_change_error(err: NodeError) -> CameraError {
    match err {
        NodeError::Busy(_) => CameraError::RequiresReopen,
        NodeError::Rejected(msg) => CameraError::UnsupportedMode(msg),
        NodeError::Disconnected => CameraError::DeviceDisconnected,
        other => CameraError::UnsupportedMode(other.to_string()),
    }
}

/// One open, streaming device
pub struct DeviceSession {
    node: Box<dyn VideoNode>,
    mode: StreamMode,
    sequence: u64,
    timeout: Duration,
}

impl DeviceSession {
    /// Open a device and start streaming exactly the requested mode
    pub fn open(
        source: &dyn DeviceSource,
        index: u32,
        resolution: Resolution,
        fps: u32,
    ) -> Result<Self, CameraError> {
        let mut node = source.open(index).map_err(open_error)?;

        let requested = StreamMode {
            width: resolution.width(),
            height: resolution.height(),
            fps,
        };
        let negotiated = node.start(requested).map_err(open_error)?;

        if negotiated != requested {
            let _ = node.stop();
            warn!(
                device = %node.descriptor(),
                requested = %requested,
                negotiated = %negotiated,
                "Device did not accept the requested mode"
            );
            return Err(CameraError::UnsupportedMode(format!(
                "requested {}, device offers {}",
                requested, negotiated
            )));
        }

        info!(device = %node.descriptor(), mode = %negotiated, "Camera session opened");
        Ok(Self {
            node,
            mode: negotiated,
            sequence: 0,
            timeout: read_timeout(negotiated.fps),
        })
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        self.node.descriptor()
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    /// Restart frame numbering (after a warm-up burst)
    pub fn reset_sequence(&mut self) {
        self.sequence = 0;
    }

    /// Read the next frame within the bounded wait
    pub fn read(&mut self) -> Result<Frame, CameraError> {
        match self.node.next_frame(self.timeout) {
            Ok(frame) => {
                self.sequence += 1;
                Ok(frame.with_sequence(self.sequence))
            }
            Err(NodeError::Timeout) => Err(CameraError::CaptureTimeout),
            Err(NodeError::Corrupt(reason)) => {
                debug!(device = %self.node.descriptor(), %reason, "Discarding corrupt frame");
                Err(CameraError::CaptureTimeout)
            }
            Err(err) => {
                warn!(device = %self.node.descriptor(), error = %err, "Device read failed");
                Err(CameraError::DeviceDisconnected)
            }
        }
    }

    /// Stop streaming; the device is released when the session drops
    pub fn close(mut self) {
        if let Err(e) = self.node.stop() {
            debug!(device = %self.node.descriptor(), error = %e, "Ignoring close error");
        }
        info!(device = %self.node.descriptor(), "Camera session closed");
    }

    pub fn set_resolution(&mut self, resolution: Resolution) -> Result<(), CameraError> {
        if self.mode.width == resolution.width() && self.mode.height == resolution.height() {
            return Ok(());
        }
        self.node
            .set_live_resolution(resolution.width(), resolution.height())
            .map_err(live_change_error)?;
        self.mode.width = resolution.width();
        self.mode.height = resolution.height();
        debug!(mode = %self.mode, "Resolution changed in place");
        Ok(())
    }

    pub fn set_fps(&mut self, fps: u32) -> Result<(), CameraError> {
        if self.mode.fps == fps {
            return Ok(());
        }
        let applied = self.node.set_live_fps(fps).map_err(live_change_error)?;
        if applied != fps {
            // Put the old interval back before reporting
            let _ = self.node.set_live_fps(self.mode.fps);
            return Err(CameraError::UnsupportedMode(format!(
                "requested {}fps, device applied {}fps",
                fps, applied
            )));
        }
        self.mode.fps = fps;
        self.timeout = read_timeout(fps);
        debug!(mode = %self.mode, "Frame rate changed in place");
        Ok(())
    }

    pub fn control_range(&self, control: Control) -> Option<ControlRange> {
        self.node.control_range(control)
    }

    pub fn get_control(&self, control: Control) -> Option<i32> {
        self.node.get_control(control)
    }

    /// Best-effort control write; `false` when rejected
    pub fn try_set_control(&mut self, control: Control, value: i32) -> bool {
        match self.node.set_control(control, value) {
            Ok(()) => true,
            Err(e) => {
                debug!(?control, value, error = %e, "Control write rejected");
                false
            }
        }
    }
}

/// A device source and the session currently opened from it
///
/// Holds the state every backend variant shares. Dropping the slot closes the
/// session.
pub struct SessionSlot {
    source: Arc<dyn DeviceSource>,
    session: Option<DeviceSession>,
}

impl SessionSlot {
    pub fn new(source: Arc<dyn DeviceSource>) -> Self {
        Self {
            source,
            session: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Close any open session, then open `index` in the requested mode
    pub fn open(
        &mut self,
        index: u32,
        resolution: Resolution,
        fps: u32,
    ) -> Result<&mut DeviceSession, CameraError> {
        self.close();
        let session = DeviceSession::open(self.source.as_ref(), index, resolution, fps)?;
        Ok(self.session.insert(session))
    }

    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
    }

    pub fn session_mut(&mut self) -> Option<&mut DeviceSession> {
        self.session.as_mut()
    }

    pub fn read_frame(&mut self) -> Result<Frame, CameraError> {
        self.session.as_mut().ok_or(CameraError::NotOpen)?.read()
    }

    pub fn set_resolution(&mut self, resolution: Resolution) -> Result<(), CameraError> {
        self.session
            .as_mut()
            .ok_or(CameraError::NotOpen)?
            .set_resolution(resolution)
    }

    pub fn set_fps(&mut self, fps: u32) -> Result<(), CameraError> {
        self.session.as_mut().ok_or(CameraError::NotOpen)?.set_fps(fps)
    }

    pub fn list_devices(&self) -> Vec<DeviceDescriptor> {
        self.source.enumerate()
    }

    pub fn current_device(&self) -> Option<&DeviceDescriptor> {
        self.session.as_ref().map(DeviceSession::descriptor)
    }
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::{CameraKind, SimulatedDevice, SimulatedSource};

    #[test]
    fn test_read_timeout_bounds() {
        assert_eq!(read_timeout(15), Duration::from_millis(132));
        assert_eq!(read_timeout(30), Duration::from_millis(100));
        assert_eq!(read_timeout(60), Duration::from_millis(100));
        assert_eq!(read_timeout(0), Duration::from_millis(2000));
    }

    #[test]
    fn test_slot_reopen_releases_previous_device() {
        let usb = SimulatedSource::new(CameraKind::Usb)
            .with_device(SimulatedDevice::new("first"))
            .with_device(SimulatedDevice::new("second"));
        let mut slot = SessionSlot::new(Arc::new(usb.clone()));
        assert_eq!(slot.read_frame().unwrap_err(), CameraError::NotOpen);

        slot.open(0, Resolution::Hd, 30).unwrap();
        assert!(usb.is_held(0));
        slot.open(1, Resolution::Hd, 30).unwrap();
        assert!(!usb.is_held(0));
        assert!(usb.is_held(1));
        assert_eq!(slot.current_device().map(|d| d.index), Some(1));

        drop(slot);
        assert!(!usb.is_held(1));
    }
}
