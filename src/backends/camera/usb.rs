// SPDX-License-Identifier: GPL-3.0-only

//! Generic UVC webcam backend

use super::node::{Control, DeviceSource};
use super::session::SessionSlot;
use super::types::Resolution;
use crate::errors::CameraError;
use std::sync::Arc;
use tracing::{debug, info};

/// Webcam backend mapping focus onto the UVC focus controls
pub struct UsbWebcamBackend {
    slot: SessionSlot,
}

impl UsbWebcamBackend {
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

    pub fn open(&mut self, index: u32, resolution: Resolution, fps: u32) -> Result<(), CameraError> {
        self.slot.open(index, resolution, fps)?;
        Ok(())
    }

    pub fn set_autofocus(&mut self, enabled: bool) -> bool {
        let Some(session) = self.slot.session_mut() else {
            return false;
        };
        if session.control_range(Control::FocusAuto).is_none() {
            debug!("Device has no autofocus control");
            return false;
        }
        session.try_set_control(Control::FocusAuto, i32::from(enabled))
    }

    pub fn set_manual_focus(&mut self, value: u8) -> bool {
        let Some(session) = self.slot.session_mut() else {
            return false;
        };
        let Some(range) = session.control_range(Control::FocusAbsolute) else {
            debug!("Device has no manual focus control");
            return false;
        };

        // UVC drivers ignore the lens position while autofocus runs
        if session.control_range(Control::FocusAuto).is_some()
            && session.get_control(Control::FocusAuto) != Some(0)
            && !session.try_set_control(Control::FocusAuto, 0)
        {
            return false;
        }

        let position = range.scale_from_u8(value);
        let applied = session.try_set_control(Control::FocusAbsolute, position);
        if applied {
            info!(value, position, "Manual focus applied");
        }
        applied
    }
}
