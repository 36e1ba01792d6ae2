// SPDX-License-Identifier: GPL-3.0-only

//! Inspection station core for a machine-vision quality-control bench
//!
//! This library drives a USB webcam or a depth camera, keeps a live frame feed
//! flowing to any number of consumers, applies configuration changes to the
//! running camera, and stores labeled OK / NOT_OK samples for dataset building.
//!
//! # Architecture
//!
//! - [`backends`]: camera backends, V4L2 and simulated device sources, the
//!   frame acquisition loop
//! - [`app`]: the settings application controller and the [`InspectionStation`]
//!   facade tying everything together
//! - [`dataset`]: sample naming, encoding, statistics and the recent gallery
//! - [`config`]: persisted station configuration
//!
//! # Example
//!
//! ```ignore
//! let config = Config::load(&path)?;
//! let station = InspectionStation::new(&config, DeviceSources::v4l2());
//! station.start()?;
//! let _driver = station.spawn_driver();
//! let sample = station.capture(Label::NotOk, Some("Crack"))?;
//! ```

pub mod app;
pub mod backends;
pub mod config;
pub mod constants;
pub mod dataset;
pub mod errors;

pub use app::{ApplyOutcome, InspectionStation, SettingsApplicationController, SettingsChange};
pub use backends::camera::{
    CameraBackend, CameraConfig, CameraKind, DeviceSources, Frame, FrameAcquisitionLoop,
    Resolution,
};
pub use config::Config;
pub use dataset::{DatasetCaptureStore, Label, Sample, Statistics};
