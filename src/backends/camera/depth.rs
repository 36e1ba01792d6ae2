// SPDX-License-Identifier: GPL-3.0-only

//! Structured-light depth camera backend
//!
//! Streams the color sensor of a depth camera. The color optics have a fixed
//! focus, so manual focus requests fall back to re-enabling auto exposure.

use super::node::{Control, DeviceSource};
use super::session::{DeviceSession, SessionSlot};
use super::types::Resolution;
use super::v4l2_controls::{V4L2_EXPOSURE_APERTURE_PRIORITY, V4L2_EXPOSURE_AUTO};
use crate::constants::depth;
use crate::errors::CameraError;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Read and discard frames until auto exposure has settled
fn warm_up(session: &mut DeviceSession) -> Result<(), CameraError> {
    for _ in 0..depth::WARMUP_FRAMES {
        match session.read() {
            Ok(_) | Err(CameraError::CaptureTimeout) => {}
            Err(e) => {
                warn!(error = %e, "Depth camera lost during warm-up");
                return Err(CameraError::DeviceUnavailable(e.to_string()));
            }
        }
    }
    session.reset_sequence();
    debug!(frames = depth::WARMUP_FRAMES, "Depth camera warm-up done");
    Ok(())
}

pub struct DepthCameraBackend {
    slot: SessionSlot,
}

impl DepthCameraBackend {
    pub fn new(source: Arc<dyn DeviceSource>) -> Self {
        Self {
            slot: SessionSlot::new(source),
        }
    }

    pub fn slot(&self) -> &SessionSlot {
        &self.slot
    }

    pub fn slot_mut(&mut self) -> &mut SessionSlot {
        &mut self.slot
    }

    /// Open the color stream and let exposure settle before serving frames
    pub fn open(&mut self, index: u32, resolution: Resolution, fps: u32) -> Result<(), CameraError> {
        let session = self.slot.open(index, resolution, fps)?;
        if let Err(e) = warm_up(session) {
            self.slot.close();
            return Err(e);
        }
        Ok(())
    }

    pub fn set_autofocus(&mut self, enabled: bool) -> bool {
        let Some(session) = self.slot.session_mut() else {
            return false;
        };
        if session.control_range(Control::FocusAuto).is_none() {
            return false;
        }
        session.try_set_control(Control::FocusAuto, i32::from(enabled))
    }

    /// Always `false`: the lens has no focus element
    pub fn set_manual_focus(&mut self, value: u8) -> bool {
        let Some(session) = self.slot.session_mut() else {
            return false;
        };
        if session.control_range(Control::ExposureAuto).is_some() {
            let restored = session
                .try_set_control(Control::ExposureAuto, V4L2_EXPOSURE_APERTURE_PRIORITY)
                || session.try_set_control(Control::ExposureAuto, V4L2_EXPOSURE_AUTO);
            info!(value, restored, "Fixed-focus depth camera, re-enabled auto exposure instead");
        }
        false
    }
}
