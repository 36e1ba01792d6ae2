// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 device source
//!
//! Scans `/dev/video*`, groups capture nodes by USB bus and decides which kind
//! each physical device is. A bus that carries a depth stream belongs to a depth
//! camera; its color node is the one the station attaches to. Every other capture
//! node with a usable color format is a plain webcam.

use super::format_converters::{expected_frame_size, mjpeg_to_rgb, uyvy_to_rgb, yuyv_to_rgb};
use super::node::{Control, ControlRange, DeviceSource, NodeError, StreamMode, VideoNode};
use super::types::{CameraKind, DeviceDescriptor, Frame};
use super::v4l2_controls;
use crate::constants::{depth, formats};
use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::capability::Flags;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::video::capture::Parameters;
use v4l::{Format, FourCC};

/// One capture node found during a scan
#[derive(Debug, Clone)]
pub(crate) struct ScannedNode {
    pub path: String,
    pub card: String,
    pub driver: String,
    pub bus: String,
    pub formats: Vec<[u8; 4]>,
}

impl ScannedNode {
    fn offers(&self, fourcc: &[u8; 4]) -> bool {
        self.formats.iter().any(|f| f == fourcc)
    }

    fn offers_depth(&self) -> bool {
        formats::DEPTH_FOURCCS.iter().any(|f| self.offers(f))
    }

    fn first_preferred(&self, preference: &[&[u8; 4]]) -> Option<[u8; 4]> {
        preference.iter().find(|f| self.offers(f)).map(|f| **f)
    }
}

fn video_index(path: &str) -> u32 {
    path.trim_start_matches("/dev/video")
        .parse()
        .unwrap_or(u32::MAX)
}

/// Scan all capture nodes, skipping metadata-only nodes without formats
fn scan_nodes() -> Vec<ScannedNode> {
    let mut nodes: Vec<ScannedNode> = std::fs::read_dir("/dev")
        .into_iter()
        .flatten()
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            name.starts_with("video").then(|| format!("/dev/{}", name))
        })
        .filter_map(|path| {
            let dev = Device::with_path(&path).ok()?;
            let caps = dev.query_caps().ok()?;
            if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
                return None;
            }
            let formats: Vec<[u8; 4]> = dev
                .enum_formats()
                .into_iter()
                .flatten()
                .map(|desc| desc.fourcc.repr)
                .collect();
            if formats.is_empty() {
                debug!(path = %path, "Skipping node without capture formats");
                return None;
            }
            Some(ScannedNode {
                path,
                card: caps.card,
                driver: caps.driver,
                bus: caps.bus,
                formats,
            })
        })
        .collect();

    nodes.sort_by_key(|n| video_index(&n.path));
    nodes
}

/// Pick the attachable nodes of one kind, in scan order
pub(crate) fn classify(nodes: &[ScannedNode], kind: CameraKind) -> Vec<DeviceDescriptor> {
    let depth_buses: HashSet<&str> = nodes
        .iter()
        .filter(|n| n.offers_depth() || depth::DEPTH_DRIVERS.contains(&n.driver.as_str()))
        .map(|n| n.bus.as_str())
        .collect();

    let mut picked: Vec<&ScannedNode> = Vec::new();
    match kind {
        CameraKind::Usb => {
            picked.extend(nodes.iter().filter(|n| {
                !depth_buses.contains(n.bus.as_str())
                    && n.first_preferred(formats::USB_FOURCC_PREFERENCE).is_some()
            }));
        }
        CameraKind::Depth => {
            // One color node per depth bus
            let mut seen = HashSet::new();
            for node in nodes {
                if depth_buses.contains(node.bus.as_str())
                    && !node.offers_depth()
                    && node
                        .first_preferred(formats::DEPTH_COLOR_FOURCC_PREFERENCE)
                        .is_some()
                    && seen.insert(node.bus.as_str())
                {
                    picked.push(node);
                }
            }
        }
    }

    picked
        .into_iter()
        .enumerate()
        .map(|(index, node)| DeviceDescriptor {
            index: index as u32,
            kind,
            name: node.card.clone(),
            path: node.path.clone(),
            driver: node.driver.clone(),
        })
        .collect()
}

/// Translate an OS error into the device-layer vocabulary
pub(crate) fn map_io_error(err: &io::Error) -> NodeError {
    if matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    ) {
        return NodeError::Timeout;
    }
    match err.raw_os_error() {
        Some(libc::ENODEV) | Some(libc::ENXIO) => NodeError::Disconnected,
        Some(libc::EBUSY) => NodeError::Busy(err.to_string()),
        Some(libc::ENOENT) => NodeError::NotFound(err.to_string()),
        Some(libc::EINVAL) | Some(libc::ERANGE) => NodeError::Rejected(err.to_string()),
        _ => NodeError::Io(err.to_string()),
    }
}

fn control_id(control: Control) -> u32 {
    match control {
        Control::FocusAuto => v4l2_controls::V4L2_CID_FOCUS_AUTO,
        Control::FocusAbsolute => v4l2_controls::V4L2_CID_FOCUS_ABSOLUTE,
        Control::ExposureAuto => v4l2_controls::V4L2_CID_EXPOSURE_AUTO,
    }
}

fn fps_from_params(params: &Parameters, fallback: u32) -> u32 {
    let interval = params.interval;
    if interval.numerator > 0 {
        interval.denominator / interval.numerator
    } else {
        fallback
    }
}

/// Device source backed by real V4L2 nodes
pub struct V4l2Source {
    kind: CameraKind,
}

impl V4l2Source {
    pub fn new(kind: CameraKind) -> Self {
        Self { kind }
    }

    fn preference(&self) -> &'static [&'static [u8; 4]] {
        match self.kind {
            CameraKind::Usb => formats::USB_FOURCC_PREFERENCE,
            CameraKind::Depth => formats::DEPTH_COLOR_FOURCC_PREFERENCE,
        }
    }
}

impl DeviceSource for V4l2Source {
    fn kind(&self) -> CameraKind {
        self.kind
    }

    fn enumerate(&self) -> Vec<DeviceDescriptor> {
        let devices = classify(&scan_nodes(), self.kind);
        debug!(kind = %self.kind, count = devices.len(), "Enumerated V4L2 devices");
        devices
    }

    fn open(&self, index: u32) -> Result<Box<dyn VideoNode>, NodeError> {
        let descriptor = self
            .enumerate()
            .into_iter()
            .find(|d| d.index == index)
            .ok_or_else(|| NodeError::NotFound(format!("no {} at index {}", self.kind, index)))?;

        if !Path::new(&descriptor.path).exists() {
            return Err(NodeError::NotFound(descriptor.path));
        }

        let device = Device::with_path(&descriptor.path).map_err(|e| map_io_error(&e))?;
        info!(device = %descriptor, driver = %descriptor.driver, "Opened V4L2 device");

        Ok(Box::new(V4l2Node {
            descriptor,
            device,
            preference: self.preference(),
            stream: None,
            active: None,
        }))
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveFormat {
    fourcc: [u8; 4],
    width: u32,
    height: u32,
}

/// One opened V4L2 capture node
pub struct V4l2Node {
    descriptor: DeviceDescriptor,
    device: Device,
    preference: &'static [&'static [u8; 4]],
    stream: Option<Stream<'static>>,
    active: Option<ActiveFormat>,
}

impl V4l2Node {
    fn negotiate_fourcc(&self) -> Result<[u8; 4], NodeError> {
        let offered: Vec<[u8; 4]> = self
            .device
            .enum_formats()
            .map_err(|e| map_io_error(&e))?
            .into_iter()
            .map(|desc| desc.fourcc.repr)
            .collect();

        self.preference
            .iter()
            .find(|f| offered.contains(f))
            .map(|f| **f)
            .ok_or_else(|| NodeError::Rejected("no supported pixel format".to_string()))
    }

    fn convert(active: ActiveFormat, buf: &[u8]) -> Result<Frame, NodeError> {
        let ActiveFormat {
            fourcc,
            width,
            height,
        } = active;

        if &fourcc == b"MJPG" {
            let (rgb, w, h) = mjpeg_to_rgb(buf).map_err(NodeError::Corrupt)?;
            return Ok(Frame::new(w, h, 3, rgb));
        }

        let expected = expected_frame_size(&fourcc, width, height)
            .ok_or_else(|| NodeError::Corrupt(format!("unhandled format {:?}", fourcc)))?;
        if buf.len() < expected {
            return Err(NodeError::Corrupt(format!(
                "short buffer: {} of {} bytes",
                buf.len(),
                expected
            )));
        }
        let raw = &buf[..expected];

        let rgb = match &fourcc {
            b"YUYV" => yuyv_to_rgb(raw, width, height),
            b"UYVY" => uyvy_to_rgb(raw, width, height),
            _ => raw.to_vec(),
        };
        Ok(Frame::new(width, height, 3, rgb))
    }
}

impl VideoNode for V4l2Node {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn start(&mut self, mode: StreamMode) -> Result<StreamMode, NodeError> {
        self.stop()?;

        let fourcc = self.negotiate_fourcc()?;
        let requested = Format::new(mode.width, mode.height, FourCC::new(&fourcc));
        let actual = self
            .device
            .set_format(&requested)
            .map_err(|e| map_io_error(&e))?;
        if actual.fourcc.repr != fourcc {
            return Err(NodeError::Rejected(format!(
                "driver switched pixel format to {}",
                actual.fourcc
            )));
        }

        let fps = match self.device.set_params(&Parameters::with_fps(mode.fps)) {
            Ok(params) => fps_from_params(&params, mode.fps),
            Err(e) => {
                warn!(device = %self.descriptor.path, error = %e, "Frame interval not settable");
                self.device
                    .params()
                    .map(|p| fps_from_params(&p, mode.fps))
                    .unwrap_or(mode.fps)
            }
        };

        let stream = Stream::with_buffers(&self.device, Type::VideoCapture, formats::V4L2_BUFFER_COUNT)
            .map_err(|e| map_io_error(&e))?;

        let negotiated = StreamMode {
            width: actual.width,
            height: actual.height,
            fps,
        };
        info!(
            device = %self.descriptor.path,
            fourcc = %actual.fourcc,
            mode = %negotiated,
            "V4L2 stream started"
        );

        self.stream = Some(stream);
        self.active = Some(ActiveFormat {
            fourcc,
            width: actual.width,
            height: actual.height,
        });
        Ok(negotiated)
    }

    fn stop(&mut self) -> Result<(), NodeError> {
        // Dropping the stream issues STREAMOFF and unmaps the buffers
        if self.stream.take().is_some() {
            debug!(device = %self.descriptor.path, "V4L2 stream stopped");
        }
        self.active = None;
        Ok(())
    }

    fn next_frame(&mut self, timeout: Duration) -> Result<Frame, NodeError> {
        let active = self.active.ok_or(NodeError::Disconnected)?;
        let stream = self.stream.as_mut().ok_or(NodeError::Disconnected)?;
        stream.set_timeout(timeout);

        let (buf, _meta) = stream.next().map_err(|e| map_io_error(&e))?;
        Self::convert(active, buf)
    }

    fn control_range(&self, control: Control) -> Option<ControlRange> {
        v4l2_controls::query_control(&self.descriptor.path, control_id(control)).map(|info| {
            ControlRange {
                minimum: info.minimum,
                maximum: info.maximum,
                step: info.step,
                default_value: info.default_value,
            }
        })
    }

    fn get_control(&self, control: Control) -> Option<i32> {
        v4l2_controls::get_control(&self.descriptor.path, control_id(control))
    }

    fn set_control(&mut self, control: Control, value: i32) -> Result<(), NodeError> {
        v4l2_controls::set_control(&self.descriptor.path, control_id(control), value)
            .map_err(|e| map_io_error(&e))
    }

    fn set_live_resolution(&mut self, width: u32, height: u32) -> Result<(), NodeError> {
        if self.stream.is_some() {
            return Err(NodeError::Busy(format!(
                "{}x{} needs a stream restart",
                width, height
            )));
        }
        Ok(())
    }

    fn set_live_fps(&mut self, fps: u32) -> Result<u32, NodeError> {
        let params = self
            .device
            .set_params(&Parameters::with_fps(fps))
            .map_err(|e| map_io_error(&e))?;
        Ok(fps_from_params(&params, fps))
    }
}
