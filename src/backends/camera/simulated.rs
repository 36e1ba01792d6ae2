// SPDX-License-Identifier: GPL-3.0-only

//! Scriptable in-process device source
//!
//! Stands in for real hardware in tests and in `--simulate` runs. Devices serve a
//! gradient test pattern and can be told to time out, vanish, stay busy, reject
//! modes or lack a focus motor. Every control write is recorded so callers can
//! check what reached the "hardware".

use super::node::{Control, ControlRange, DeviceSource, NodeError, StreamMode, VideoNode};
use super::types::{CameraKind, DeviceDescriptor, Frame, Resolution};
use crate::constants::formats;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Description of one simulated device
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    pub name: String,
    /// Resolutions the sensor can stream
    pub resolutions: Vec<Resolution>,
    /// Frame rates the sensor can stream
    pub framerates: Vec<u32>,
    /// Exposes autofocus and absolute focus controls
    pub focus: bool,
    /// Exposes the auto exposure control
    pub exposure: bool,
    /// Accepts resolution and frame rate changes while streaming
    pub live_mode_change: bool,
}

impl SimulatedDevice {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            resolutions: Resolution::ALL.to_vec(),
            framerates: formats::SUPPORTED_FRAMERATES.to_vec(),
            focus: true,
            exposure: true,
            live_mode_change: false,
        }
    }

    /// Device without a focus motor
    pub fn fixed_focus(mut self) -> Self {
        self.focus = false;
        self
    }

    pub fn with_resolutions(mut self, resolutions: &[Resolution]) -> Self {
        self.resolutions = resolutions.to_vec();
        self
    }

    pub fn with_framerates(mut self, framerates: &[u32]) -> Self {
        self.framerates = framerates.to_vec();
        self
    }

    pub fn with_live_mode_change(mut self) -> Self {
        self.live_mode_change = true;
        self
    }

    fn range(&self, control: Control) -> Option<ControlRange> {
        match control {
            Control::FocusAuto if self.focus => Some(ControlRange {
                minimum: 0,
                maximum: 1,
                step: 1,
                default_value: 1,
            }),
            // Same shape as common UVC focus motors
            Control::FocusAbsolute if self.focus => Some(ControlRange {
                minimum: 0,
                maximum: 250,
                step: 5,
                default_value: 0,
            }),
            Control::ExposureAuto if self.exposure => Some(ControlRange {
                minimum: 0,
                maximum: 3,
                step: 1,
                default_value: 3,
            }),
            _ => None,
        }
    }

    /// Mode the sensor falls back to when a request is outside its capabilities
    fn negotiate(&self, mode: StreamMode) -> StreamMode {
        let (width, height) = match Resolution::from_dimensions(mode.width, mode.height) {
            Some(res) if self.resolutions.contains(&res) => (mode.width, mode.height),
            _ => self
                .resolutions
                .iter()
                .find(|r| r.width() <= mode.width)
                .or(self.resolutions.last())
                .map(|r| (r.width(), r.height()))
                .unwrap_or((mode.width, mode.height)),
        };
        let fps = if self.framerates.contains(&mode.fps) {
            mode.fps
        } else {
            self.framerates
                .iter()
                .copied()
                .filter(|f| *f <= mode.fps)
                .max()
                .or_else(|| self.framerates.iter().copied().min())
                .unwrap_or(mode.fps)
        };
        StreamMode { width, height, fps }
    }
}

struct DeviceSlot {
    device: SimulatedDevice,
    present: bool,
    busy_elsewhere: bool,
    held: bool,
    controls: HashMap<Control, i32>,
}

#[derive(Default)]
struct SimState {
    slots: Vec<DeviceSlot>,
    pending_timeouts: u32,
    pending_corrupt: u32,
    control_writes: Vec<(Control, i32)>,
    opens: u32,
    reads: u64,
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Simulated device source; clones share the same devices
#[derive(Clone)]
pub struct SimulatedSource {
    kind: CameraKind,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedSource {
    /// Source with no devices attached
    pub fn new(kind: CameraKind) -> Self {
        Self {
            kind,
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    /// Attach a device and return the source (builder form)
    pub fn with_device(self, device: SimulatedDevice) -> Self {
        self.add_device(device);
        self
    }

    /// Attach a device, returning its index
    pub fn add_device(&self, device: SimulatedDevice) -> u32 {
        let mut state = lock(&self.state);
        let controls = [Control::FocusAuto, Control::FocusAbsolute, Control::ExposureAuto]
            .into_iter()
            .filter_map(|c| device.range(c).map(|r| (c, r.default_value)))
            .collect();
        state.slots.push(DeviceSlot {
            device,
            present: true,
            busy_elsewhere: false,
            held: false,
            controls,
        });
        (state.slots.len() - 1) as u32
    }

    /// Pull the cable: open handles start reporting a disconnect
    pub fn unplug(&self, index: u32) {
        if let Some(slot) = lock(&self.state).slots.get_mut(index as usize) {
            slot.present = false;
            slot.held = false;
        }
    }

    /// Plug a previously unplugged device back in
    pub fn replug(&self, index: u32) {
        if let Some(slot) = lock(&self.state).slots.get_mut(index as usize) {
            slot.present = true;
        }
    }

    /// Mark a device as held by another process
    pub fn set_busy(&self, index: u32, busy: bool) {
        if let Some(slot) = lock(&self.state).slots.get_mut(index as usize) {
            slot.busy_elsewhere = busy;
        }
    }

    /// Make the next `count` reads time out
    pub fn inject_timeouts(&self, count: u32) {
        lock(&self.state).pending_timeouts += count;
    }

    /// Make the next `count` reads deliver undecodable data
    pub fn inject_corrupt_frames(&self, count: u32) {
        lock(&self.state).pending_corrupt += count;
    }

    /// Every control write in order, across all devices
    pub fn control_writes(&self) -> Vec<(Control, i32)> {
        lock(&self.state).control_writes.clone()
    }

    /// Current value of a control on a device
    pub fn control_value(&self, index: u32, control: Control) -> Option<i32> {
        lock(&self.state)
            .slots
            .get(index as usize)
            .and_then(|slot| slot.controls.get(&control).copied())
    }

    /// Number of successful opens so far
    pub fn open_count(&self) -> u32 {
        lock(&self.state).opens
    }

    /// Number of frame reads attempted so far
    pub fn read_count(&self) -> u64 {
        lock(&self.state).reads
    }

    /// True while a node holds the device open
    pub fn is_held(&self, index: u32) -> bool {
        lock(&self.state)
            .slots
            .get(index as usize)
            .is_some_and(|slot| slot.held)
    }
}

impl DeviceSource for SimulatedSource {
    fn kind(&self) -> CameraKind {
        self.kind
    }

    fn enumerate(&self) -> Vec<DeviceDescriptor> {
        lock(&self.state)
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.present)
            .map(|(index, slot)| descriptor(self.kind, index as u32, &slot.device))
            .collect()
    }

    fn open(&self, index: u32) -> Result<Box<dyn VideoNode>, NodeError> {
        let mut state = lock(&self.state);
        let slot = state
            .slots
            .get_mut(index as usize)
            .filter(|slot| slot.present)
            .ok_or_else(|| NodeError::NotFound(format!("no simulated device {}", index)))?;

        if slot.busy_elsewhere || slot.held {
            return Err(NodeError::Busy(format!("{} is in use", slot.device.name)));
        }
        slot.held = true;
        let descriptor = descriptor(self.kind, index, &slot.device);
        state.opens += 1;
        debug!(device = %descriptor, "Opened simulated device");

        Ok(Box::new(SimulatedNode {
            source: self.clone(),
            descriptor,
            mode: None,
            pattern: None,
        }))
    }
}

fn descriptor(kind: CameraKind, index: u32, device: &SimulatedDevice) -> DeviceDescriptor {
    DeviceDescriptor {
        index,
        kind,
        name: device.name.clone(),
        path: format!("sim://{}/{}", kind_slug(kind), index),
        driver: "simulated".to_string(),
    }
}

fn kind_slug(kind: CameraKind) -> &'static str {
    match kind {
        CameraKind::Usb => "usb",
        CameraKind::Depth => "depth",
    }
}

/// Horizontal red ramp, vertical green ramp, constant blue
fn test_pattern(width: u32, height: u32) -> Arc<[u8]> {
    let mut data = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height {
        let g = (y * 255 / height.max(1)) as u8;
        for x in 0..width {
            let r = (x * 255 / width.max(1)) as u8;
            data.extend_from_slice(&[r, g, 96]);
        }
    }
    Arc::from(data.into_boxed_slice())
}

/// Opened simulated device
pub struct SimulatedNode {
    source: SimulatedSource,
    descriptor: DeviceDescriptor,
    mode: Option<StreamMode>,
    pattern: Option<Arc<[u8]>>,
}

impl SimulatedNode {
    fn index(&self) -> usize {
        self.descriptor.index as usize
    }

    fn with_slot<T>(&self, f: impl FnOnce(&mut DeviceSlot) -> T) -> Option<T> {
        let mut state = lock(&self.source.state);
        state.slots.get_mut(self.index()).map(f)
    }

    fn present(&self) -> bool {
        self.with_slot(|slot| slot.present).unwrap_or(false)
    }

    fn device(&self) -> Option<SimulatedDevice> {
        self.with_slot(|slot| slot.device.clone())
    }
}

impl VideoNode for SimulatedNode {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn start(&mut self, mode: StreamMode) -> Result<StreamMode, NodeError> {
        if !self.present() {
            return Err(NodeError::Disconnected);
        }
        let device = self.device().ok_or(NodeError::Disconnected)?;
        let negotiated = device.negotiate(mode);
        self.pattern = Some(test_pattern(negotiated.width, negotiated.height));
        self.mode = Some(negotiated);
        debug!(device = %self.descriptor, mode = %negotiated, "Simulated stream started");
        Ok(negotiated)
    }

    fn stop(&mut self) -> Result<(), NodeError> {
        self.mode = None;
        self.pattern = None;
        Ok(())
    }

    fn next_frame(&mut self, _timeout: Duration) -> Result<Frame, NodeError> {
        {
            let mut state = lock(&self.source.state);
            state.reads += 1;
            let present = state
                .slots
                .get(self.index())
                .is_some_and(|slot| slot.present);
            if !present {
                return Err(NodeError::Disconnected);
            }
            if state.pending_timeouts > 0 {
                state.pending_timeouts -= 1;
                return Err(NodeError::Timeout);
            }
            if state.pending_corrupt > 0 {
                state.pending_corrupt -= 1;
                return Err(NodeError::Corrupt("truncated JPEG".to_string()));
            }
        }

        let (mode, pattern) = match (self.mode, self.pattern.as_ref()) {
            (Some(mode), Some(pattern)) => (mode, Arc::clone(pattern)),
            _ => return Err(NodeError::Disconnected),
        };

        Ok(Frame {
            width: mode.width,
            height: mode.height,
            channels: 3,
            data: pattern,
            captured_at: Instant::now(),
            sequence: 0,
        })
    }

    fn control_range(&self, control: Control) -> Option<ControlRange> {
        self.device().and_then(|device| device.range(control))
    }

    fn get_control(&self, control: Control) -> Option<i32> {
        self.with_slot(|slot| slot.controls.get(&control).copied())
            .flatten()
    }

    fn set_control(&mut self, control: Control, value: i32) -> Result<(), NodeError> {
        let mut state = lock(&self.source.state);
        let slot = state
            .slots
            .get_mut(self.index())
            .filter(|slot| slot.present)
            .ok_or(NodeError::Disconnected)?;

        let range = slot
            .device
            .range(control)
            .ok_or_else(|| NodeError::Rejected(format!("{:?} not supported", control)))?;
        if value < range.minimum || value > range.maximum {
            return Err(NodeError::Rejected(format!(
                "{:?} value {} outside {}..={}",
                control, value, range.minimum, range.maximum
            )));
        }

        slot.controls.insert(control, value);
        state.control_writes.push((control, value));
        Ok(())
    }

    fn set_live_resolution(&mut self, width: u32, height: u32) -> Result<(), NodeError> {
        let device = self.device().ok_or(NodeError::Disconnected)?;
        let Some(mode) = self.mode else {
            return Ok(());
        };
        if !device.live_mode_change {
            return Err(NodeError::Busy("stream restart required".to_string()));
        }
        let requested = StreamMode {
            width,
            height,
            fps: mode.fps,
        };
        let negotiated = device.negotiate(requested);
        if negotiated != requested {
            return Err(NodeError::Rejected(format!("{}x{}", width, height)));
        }
        self.pattern = Some(test_pattern(width, height));
        self.mode = Some(negotiated);
        Ok(())
    }

    fn set_live_fps(&mut self, fps: u32) -> Result<u32, NodeError> {
        let device = self.device().ok_or(NodeError::Disconnected)?;
        let Some(mode) = self.mode else {
            return Ok(fps);
        };
        if !device.live_mode_change {
            return Err(NodeError::Busy("stream restart required".to_string()));
        }
        let negotiated = device.negotiate(StreamMode { fps, ..mode });
        self.mode = Some(negotiated);
        Ok(negotiated.fps)
    }
}

impl Drop for SimulatedNode {
    fn drop(&mut self) {
        self.with_slot(|slot| slot.held = false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hd() -> StreamMode {
        StreamMode {
            width: 1280,
            height: 720,
            fps: 30,
        }
    }

    #[test]
    fn test_open_is_exclusive() {
        let source = SimulatedSource::new(CameraKind::Usb).with_device(SimulatedDevice::new("cam"));
        let node = source.open(0).unwrap();
        assert!(matches!(source.open(0), Err(NodeError::Busy(_))));
        drop(node);
        assert!(source.open(0).is_ok());
    }

    #[test]
    fn test_unplug_hides_device() {
        let source = SimulatedSource::new(CameraKind::Usb).with_device(SimulatedDevice::new("cam"));
        let mut node = source.open(0).unwrap();
        node.start(hd()).unwrap();
        source.unplug(0);
        assert_eq!(node.next_frame(Duration::from_millis(1)).unwrap_err(), NodeError::Disconnected);
        assert!(source.enumerate().is_empty());
        assert!(matches!(source.open(0), Err(NodeError::NotFound(_))));
    }

    #[test]
    fn test_unsupported_mode_falls_back() {
        let device = SimulatedDevice::new("vga-only").with_resolutions(&[Resolution::Vga]);
        let source = SimulatedSource::new(CameraKind::Usb).with_device(device);
        let mut node = source.open(0).unwrap();
        let negotiated = node.start(hd()).unwrap();
        assert_eq!((negotiated.width, negotiated.height), (640, 480));
    }

    #[test]
    fn test_frames_share_pattern() {
        let source = SimulatedSource::new(CameraKind::Usb).with_device(SimulatedDevice::new("cam"));
        let mut node = source.open(0).unwrap();
        node.start(hd()).unwrap();
        let a = node.next_frame(Duration::from_millis(1)).unwrap();
        let b = node.next_frame(Duration::from_millis(1)).unwrap();
        assert!(Arc::ptr_eq(&a.data, &b.data));
        assert_eq!(a.data.len(), 1280 * 720 * 3);
    }

    #[test]
    fn test_fixed_focus_rejects_focus_writes() {
        let source = SimulatedSource::new(CameraKind::Usb)
            .with_device(SimulatedDevice::new("fixed").fixed_focus());
        let mut node = source.open(0).unwrap();
        assert!(node.control_range(Control::FocusAbsolute).is_none());
        assert!(node.set_control(Control::FocusAbsolute, 10).is_err());
        assert!(source.control_writes().is_empty());
    }
}
