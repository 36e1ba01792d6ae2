// SPDX-License-Identifier: GPL-3.0-only

//! Inspection station orchestration
//!
//! [`InspectionStation`] wires the acquisition loop, the settings controller
//! and the dataset store together. UI surfaces subscribe to the loop for live
//! frames and call [`InspectionStation::capture`] to store the current frame.

pub mod settings_controller;

pub use settings_controller::{
    ApplyOutcome, ControllerState, SettingsApplicationController, SettingsChange,
};

use crate::backends::camera::{
    CaptureHold, CameraKind, ConnectionState, DeviceDescriptor, DeviceSources, Frame,
    FrameAcquisitionLoop, FrameConsumer, SubscriptionId, TickDriver,
};
use crate::config::Config;
use crate::dataset::{DatasetCaptureStore, GalleryEntry, Label, Sample, Statistics};
use crate::errors::{CaptureError, SettingsError};
use std::sync::Arc;
use tracing::{debug, info};

pub struct InspectionStation {
    frame_loop: FrameAcquisitionLoop,
    settings: SettingsApplicationController,
    store: Arc<DatasetCaptureStore>,
}

impl InspectionStation {
    pub fn new(config: &Config, sources: DeviceSources) -> Self {
        let frame_loop = FrameAcquisitionLoop::new(sources);
        let settings = SettingsApplicationController::new(frame_loop.clone(), config.camera);
        let store = Arc::new(DatasetCaptureStore::with_quality(
            config.storage_root.clone(),
            config.jpeg_quality,
        ));
        info!(
            camera = %config.camera,
            storage = %config.storage_root.display(),
            "Inspection station created"
        );
        Self {
            frame_loop,
            settings,
            store,
        }
    }

    /// Open the configured camera
    pub fn start(&self) -> Result<ApplyOutcome, SettingsError> {
        self.settings.open_current()
    }

    /// Reopen the camera after a disconnect
    pub fn reconnect(&self) -> Result<ApplyOutcome, SettingsError> {
        info!("Reconnect requested");
        self.settings.open_current()
    }

    /// Start ticking the loop on a background thread
    pub fn spawn_driver(&self) -> TickDriver {
        TickDriver::start("acquisition", self.frame_loop.clone())
    }

    pub fn frame_loop(&self) -> &FrameAcquisitionLoop {
        &self.frame_loop
    }

    pub fn settings(&self) -> &SettingsApplicationController {
        &self.settings
    }

    pub fn store(&self) -> &Arc<DatasetCaptureStore> {
        &self.store
    }

    pub fn apply(&self, change: SettingsChange) -> Result<ApplyOutcome, SettingsError> {
        self.settings.apply(change)
    }

    pub fn apply_batch(&self, changes: &[SettingsChange]) -> Vec<Result<ApplyOutcome, SettingsError>> {
        self.settings.apply_batch(changes)
    }

    pub fn subscribe(&self, consumer: Arc<dyn FrameConsumer>) -> SubscriptionId {
        self.frame_loop.subscribe(consumer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.frame_loop.unsubscribe(id)
    }

    /// Keep frames flowing for capture while no consumer is rendering
    pub fn hold_for_capture(&self) -> CaptureHold {
        self.frame_loop.hold_for_capture()
    }

    pub fn list_devices(&self, kind: CameraKind) -> Vec<DeviceDescriptor> {
        self.frame_loop.sources().for_kind(kind).enumerate()
    }

    pub fn statistics(&self) -> Statistics {
        self.store.stats()
    }

    pub fn gallery(&self) -> Vec<GalleryEntry> {
        self.store.gallery()
    }

    fn frame_for_capture(&self) -> Result<Arc<Frame>, CaptureError> {
        if self.frame_loop.connection_state() == ConnectionState::Lost {
            return Err(CaptureError::Disconnected);
        }
        self.frame_loop
            .latest_frame()
            .ok_or(CaptureError::NoFrameAvailable)
    }

    /// Store the loop's latest frame as a sample
    pub fn capture(&self, label: Label, category: Option<&str>) -> Result<Sample, CaptureError> {
        let frame = self.frame_for_capture()?;
        debug!(sequence = frame.sequence, %label, "Capturing latest frame");
        Ok(self.store.capture(&frame, label, category)?)
    }

    /// Same as [`capture`](Self::capture) with encoding on the blocking pool
    pub async fn capture_async(
        &self,
        label: Label,
        category: Option<String>,
    ) -> Result<Sample, CaptureError> {
        let frame = self.frame_for_capture()?;
        Ok(Arc::clone(&self.store)
            .capture_in_background(frame, label, category)
            .await?)
    }
}
