// SPDX-License-Identifier: GPL-3.0-only

//! Settings application controller
//!
//! Applies configuration changes to the live camera one at a time, in arrival
//! order. Callers on any thread queue their change and block until that change
//! has been applied, then receive its own result.
//!
//! Focus and autofocus are written in place. Device kind and index always reopen
//! the backend through the acquisition loop; resolution and frame rate are tried
//! in place first and fall back to a reopen when the device cannot change mode
//! while streaming. A failed reopen keeps the last-known-good configuration and
//! reopens it so the feed comes back.

use crate::backends::camera::{CameraConfig, CameraKind, FrameAcquisitionLoop, Resolution};
use crate::constants::formats;
use crate::errors::{CameraError, SettingsError};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One discrete configuration change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsChange {
    DeviceKind(CameraKind),
    DeviceIndex(u32),
    Resolution(Resolution),
    Fps(u32),
    Autofocus(bool),
    /// Lens position on the 0-255 scale
    ManualFocus(u8),
}

impl SettingsChange {
    /// Configuration after applying this change to `config`
    pub fn applied_to(&self, config: &CameraConfig) -> CameraConfig {
        let mut next = *config;
        match *self {
            SettingsChange::DeviceKind(kind) if kind != config.kind => {
                // Index and stream mode belong to the old kind; focus carries over
                let defaults = CameraConfig::default_for(kind);
                next.kind = kind;
                next.device_index = defaults.device_index;
                next.resolution = defaults.resolution;
                next.fps = defaults.fps;
            }
            SettingsChange::DeviceKind(_) => {}
            SettingsChange::DeviceIndex(index) => next.device_index = index,
            SettingsChange::Resolution(resolution) => next.resolution = resolution,
            SettingsChange::Fps(fps) => next.fps = fps,
            SettingsChange::Autofocus(enabled) => next.autofocus = enabled,
            SettingsChange::ManualFocus(value) => next.manual_focus = value,
        }
        next
    }

    fn validate(&self) -> Result<(), SettingsError> {
        match *self {
            SettingsChange::Fps(fps) if !formats::SUPPORTED_FRAMERATES.contains(&fps) => {
                Err(SettingsError::InvalidValue(format!(
                    "{} fps is not one of {:?}",
                    fps,
                    formats::SUPPORTED_FRAMERATES
                )))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for SettingsChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsChange::DeviceKind(kind) => write!(f, "device kind {}", kind),
            SettingsChange::DeviceIndex(index) => write!(f, "device index {}", index),
            SettingsChange::Resolution(resolution) => write!(f, "resolution {}", resolution),
            SettingsChange::Fps(fps) => write!(f, "frame rate {}", fps),
            SettingsChange::Autofocus(enabled) => write!(f, "autofocus {}", enabled),
            SettingsChange::ManualFocus(value) => write!(f, "manual focus {}", value),
        }
    }
}

/// How a change was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Written to the running device
    Applied,
    /// Device lacks the control; the value is kept in the configuration
    Unsupported,
    /// Stored only; reaches the device once autofocus is off or a camera is open
    Deferred,
    /// Backend was reopened with the new configuration
    Reopened,
}

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerState {
    #[default]
    Idle,
    Applying,
}

#[derive(Debug, Clone, Copy)]
enum Job {
    Change(SettingsChange),
    /// Open the current configuration (start-up, reconnect)
    Reopen,
}

type JobResult = Result<ApplyOutcome, SettingsError>;

#[derive(Default)]
struct Queue {
    pending: VecDeque<(u64, Job)>,
    results: HashMap<u64, JobResult>,
    next_ticket: u64,
    state: ControllerState,
}

struct Applied {
    /// Last-known-good configuration; never holds a value that failed to open
    config: CameraConfig,
    /// A backend has been opened with `config` at least once
    opened: bool,
}

struct Inner {
    frame_loop: FrameAcquisitionLoop,
    queue: Mutex<Queue>,
    settled: Condvar,
    applied: Mutex<Applied>,
}

/// Serializes configuration changes against the live camera
#[derive(Clone)]
pub struct SettingsApplicationController {
    inner: Arc<Inner>,
}

impl SettingsApplicationController {
    pub fn new(frame_loop: FrameAcquisitionLoop, initial: CameraConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                frame_loop,
                queue: Mutex::new(Queue::default()),
                settled: Condvar::new(),
                applied: Mutex::new(Applied {
                    config: initial,
                    opened: false,
                }),
            }),
        }
    }

    /// Current (last-known-good) configuration
    pub fn config(&self) -> CameraConfig {
        lock(&self.inner.applied).config
    }

    pub fn state(&self) -> ControllerState {
        lock(&self.inner.queue).state
    }

    /// Changes queued and not yet applied
    pub fn pending(&self) -> usize {
        lock(&self.inner.queue).pending.len()
    }

    pub fn frame_loop(&self) -> &FrameAcquisitionLoop {
        &self.inner.frame_loop
    }

    /// Apply one change, blocking until it is settled
    pub fn apply(&self, change: SettingsChange) -> JobResult {
        self.run(vec![Job::Change(change)])
            .pop()
            .unwrap_or(Ok(ApplyOutcome::Deferred))
    }

    /// Queue several changes atomically; results come back in the same order
    pub fn apply_batch(&self, changes: &[SettingsChange]) -> Vec<JobResult> {
        self.run(changes.iter().copied().map(Job::Change).collect())
    }

    /// Open the camera with the current configuration and push focus settings
    pub fn open_current(&self) -> JobResult {
        self.run(vec![Job::Reopen])
            .pop()
            .unwrap_or(Ok(ApplyOutcome::Deferred))
    }

    fn run(&self, jobs: Vec<Job>) -> Vec<JobResult> {
        let tickets: Vec<u64> = {
            let mut queue = lock(&self.inner.queue);
            jobs.into_iter()
                .map(|job| {
                    let ticket = queue.next_ticket;
                    queue.next_ticket += 1;
                    queue.pending.push_back((ticket, job));
                    ticket
                })
                .collect()
        };

        let mut queue = lock(&self.inner.queue);
        loop {
            if tickets.iter().all(|t| queue.results.contains_key(t)) {
                return tickets
                    .iter()
                    .filter_map(|t| queue.results.remove(t))
                    .collect();
            }

            if queue.state == ControllerState::Idle
                && let Some((ticket, job)) = queue.pending.pop_front()
            {
                queue.state = ControllerState::Applying;
                drop(queue);

                let result = self.execute(job);

                queue = lock(&self.inner.queue);
                queue.results.insert(ticket, result);
                queue.state = ControllerState::Idle;
                self.inner.settled.notify_all();
                continue;
            }

            queue = self
                .inner
                .settled
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn execute(&self, job: Job) -> JobResult {
        match job {
            Job::Change(change) => {
                debug!(%change, "Applying settings change");
                let result = self.apply_change(change);
                match &result {
                    Ok(outcome) => info!(%change, ?outcome, "Settings change applied"),
                    Err(e) => warn!(%change, error = %e, "Settings change failed"),
                }
                result
            }
            Job::Reopen => self.reopen_current(),
        }
    }

    /// Record `config` as last-known-good
    fn store(&self, config: CameraConfig) {
        lock(&self.inner.applied).config = config;
    }

    /// Record `config` as opened successfully
    fn commit_opened(&self, config: CameraConfig) {
        let mut applied = lock(&self.inner.applied);
        applied.config = config;
        applied.opened = true;
    }

    // The applied lock is never held across a loop call: consumers notified
    // by a tick may read `config()` while this job waits on the tick gate.
    fn apply_change(&self, change: SettingsChange) -> JobResult {
        change.validate()?;

        let current = self.config();
        let candidate = change.applied_to(&current);

        match change {
            SettingsChange::Autofocus(enabled) => {
                self.store(candidate);
                let focus = candidate.manual_focus;
                let written = self.inner.frame_loop.with_backend(|backend, config| {
                    config.autofocus = enabled;
                    let ok = backend.set_autofocus(enabled);
                    if !enabled {
                        // Remembered lens position takes over
                        backend.set_manual_focus(focus);
                    }
                    ok
                });
                Ok(control_outcome(written))
            }
            SettingsChange::ManualFocus(value) => {
                self.store(candidate);
                if candidate.autofocus {
                    debug!(value, "Autofocus on, manual focus deferred");
                    // A reconnect reopens with the loop's copy
                    let _ = self
                        .inner
                        .frame_loop
                        .with_backend(|_, config| config.manual_focus = value);
                    return Ok(ApplyOutcome::Deferred);
                }
                let written = self.inner.frame_loop.with_backend(|backend, config| {
                    config.manual_focus = value;
                    backend.set_manual_focus(value)
                });
                Ok(control_outcome(written))
            }
            SettingsChange::DeviceKind(_)
            | SettingsChange::DeviceIndex(_)
            | SettingsChange::Resolution(_)
            | SettingsChange::Fps(_) => self.apply_stream_change(current, candidate),
        }
    }

    /// Device or stream mode change: in place when possible, else a reopen
    fn apply_stream_change(&self, current: CameraConfig, candidate: CameraConfig) -> JobResult {
        if candidate == current && self.inner.frame_loop.is_active() {
            return Ok(ApplyOutcome::Applied);
        }
        if current.needs_new_backend(&candidate) {
            return self.swap(candidate);
        }
        if current.mode_differs(&candidate) {
            match self.try_mode_in_place(candidate) {
                Ok(()) => {
                    self.store(candidate);
                    return Ok(ApplyOutcome::Applied);
                }
                Err(CameraError::RequiresReopen) | Err(CameraError::NotOpen) => {}
                Err(cause) => return Err(SettingsError::Control(cause)),
            }
        }
        self.swap(candidate)
    }

    fn try_mode_in_place(&self, candidate: CameraConfig) -> Result<(), CameraError> {
        self.inner.frame_loop.with_backend(|backend, config| {
            backend.set_resolution(candidate.resolution)?;
            backend.set_fps(candidate.fps)?;
            config.resolution = candidate.resolution;
            config.fps = candidate.fps;
            Ok(())
        })?
    }

    /// Reopen with `candidate`; on failure restore last-known-good
    fn swap(&self, candidate: CameraConfig) -> JobResult {
        match self.inner.frame_loop.swap(candidate) {
            Ok(()) => {
                self.commit_opened(candidate);
                self.reapply_focus(&candidate);
                Ok(ApplyOutcome::Reopened)
            }
            Err(cause) => {
                let (good, opened) = {
                    let applied = lock(&self.inner.applied);
                    (applied.config, applied.opened)
                };
                let restored = opened && self.inner.frame_loop.swap(good).is_ok();
                if restored {
                    self.reapply_focus(&good);
                }
                warn!(
                    candidate = %candidate,
                    restored_to = %good,
                    restored,
                    error = %cause,
                    "Camera change rejected, configuration reverted"
                );
                Err(SettingsError::Swap { cause, restored })
            }
        }
    }

    fn reopen_current(&self) -> JobResult {
        let config = self.config();
        match self.inner.frame_loop.swap(config) {
            Ok(()) => {
                self.commit_opened(config);
                self.reapply_focus(&config);
                Ok(ApplyOutcome::Reopened)
            }
            Err(cause) => Err(SettingsError::Swap {
                cause,
                restored: false,
            }),
        }
    }

    /// Push the focus part of `config` to a freshly opened backend
    fn reapply_focus(&self, config: &CameraConfig) {
        let result = self.inner.frame_loop.with_backend(|backend, _| {
            if config.autofocus {
                backend.set_autofocus(true)
            } else {
                backend.set_autofocus(false);
                backend.set_manual_focus(config.manual_focus)
            }
        });
        debug!(autofocus = config.autofocus, focus = config.manual_focus, ?result, "Focus re-applied");
    }
}

fn control_outcome(written: Result<bool, CameraError>) -> ApplyOutcome {
    match written {
        Ok(true) => ApplyOutcome::Applied,
        Ok(false) => ApplyOutcome::Unsupported,
        Err(_) => ApplyOutcome::Deferred,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::node::Control;
    use crate::backends::camera::{DeviceSources, SimulatedDevice, SimulatedSource};

    fn controller_with(device: SimulatedDevice) -> (SettingsApplicationController, SimulatedSource) {
        let usb = SimulatedSource::new(CameraKind::Usb).with_device(device);
        let frame_loop = FrameAcquisitionLoop::new(DeviceSources::simulated(
            usb.clone(),
            SimulatedSource::new(CameraKind::Depth),
        ));
        let controller = SettingsApplicationController::new(frame_loop, CameraConfig::default());
        (controller, usb)
    }

    #[test]
    fn test_invalid_fps_is_rejected_before_device() {
        let (controller, usb) = controller_with(SimulatedDevice::new("cam"));
        controller.open_current().unwrap();
        let opens = usb.open_count();

        let err = controller.apply(SettingsChange::Fps(25)).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue(_)));
        assert_eq!(usb.open_count(), opens);
        assert_eq!(controller.config().fps, 30);
    }

    #[test]
    fn test_manual_focus_deferred_while_autofocus_on() {
        let (controller, usb) = controller_with(SimulatedDevice::new("cam"));
        controller.open_current().unwrap();
        controller.apply(SettingsChange::Autofocus(true)).unwrap();

        let writes_before = usb.control_writes().len();
        assert_eq!(
            controller.apply(SettingsChange::ManualFocus(40)),
            Ok(ApplyOutcome::Deferred)
        );
        assert_eq!(usb.control_writes().len(), writes_before);

        controller.apply(SettingsChange::Autofocus(false)).unwrap();
        assert_eq!(usb.control_value(0, Control::FocusAuto), Some(0));
        assert_eq!(
            usb.control_value(0, Control::FocusAbsolute),
            Some(40)
        );
    }

    #[test]
    fn test_deferred_focus_reaches_loop_config() {
        let (controller, _usb) = controller_with(SimulatedDevice::new("cam"));
        controller.open_current().unwrap();
        controller.apply(SettingsChange::Autofocus(true)).unwrap();

        assert_eq!(
            controller.apply(SettingsChange::ManualFocus(40)),
            Ok(ApplyOutcome::Deferred)
        );
        assert_eq!(
            controller.frame_loop().current_config().map(|c| c.manual_focus),
            Some(40)
        );
        assert_eq!(controller.frame_loop().current_config(), Some(controller.config()));
    }

    #[test]
    fn test_resolution_change_keeps_backend_when_live() {
        let (controller, usb) =
            controller_with(SimulatedDevice::new("cam").with_live_mode_change());
        controller.open_current().unwrap();
        let opens = usb.open_count();

        assert_eq!(
            controller.apply(SettingsChange::Resolution(Resolution::Vga)),
            Ok(ApplyOutcome::Applied)
        );
        assert_eq!(usb.open_count(), opens);
        assert_eq!(
            controller.apply(SettingsChange::DeviceIndex(0)),
            Ok(ApplyOutcome::Applied)
        );
        assert_eq!(
            controller.frame_loop().current_config().map(|c| c.resolution),
            Some(Resolution::Vga)
        );
    }

    #[test]
    fn test_changes_before_open_are_deferred() {
        let (controller, _usb) = controller_with(SimulatedDevice::new("cam"));
        assert_eq!(
            controller.apply(SettingsChange::ManualFocus(10)),
            Ok(ApplyOutcome::Deferred)
        );
        assert_eq!(controller.config().manual_focus, 10);
        assert_eq!(controller.state(), ControllerState::Idle);
    }

    #[test]
    fn test_fps_change_in_place_when_supported() {
        let (controller, usb) =
            controller_with(SimulatedDevice::new("cam").with_live_mode_change());
        controller.open_current().unwrap();
        let opens = usb.open_count();

        assert_eq!(controller.apply(SettingsChange::Fps(60)), Ok(ApplyOutcome::Applied));
        assert_eq!(usb.open_count(), opens);
        assert_eq!(controller.config().fps, 60);
        assert_eq!(controller.frame_loop().current_config().map(|c| c.fps), Some(60));
    }

    #[test]
    fn test_device_index_swap_failure_restores() {
        let (controller, _usb) = controller_with(SimulatedDevice::new("cam"));
        controller.open_current().unwrap();

        let err = controller.apply(SettingsChange::DeviceIndex(5)).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Swap {
                cause: CameraError::DeviceUnavailable(_),
                restored: true
            }
        ));
        assert_eq!(controller.config().device_index, 0);
        assert!(controller.frame_loop().is_active());
    }
}
