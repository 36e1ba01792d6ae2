// SPDX-License-Identifier: GPL-3.0-only
//! Frame acquisition loop
//!
//! One loop owns the active [`CameraBackend`] and polls it on a fixed tick. The
//! newest frame sits in a single-slot cache and is handed to every subscribed
//! consumer within the same tick, so all of them see the same `Arc<Frame>`.
//!
//! Two locks order the work. A tick holds the tick gate from start to finish
//! and the device lock only around the read itself. Swaps take the gate, so
//! they wait for an in-flight read and its notifications. Settings calls and
//! state queries take only the device lock, so consumers may use them while
//! being notified.
//!
//! Device errors never leave a tick: timeouts count as dropped frames and a
//! disconnect turns into [`ConnectionState::Lost`] plus a consumer notification.

use super::types::{CameraConfig, ConnectionState, Frame};
use super::{CameraBackend, DeviceSources};
use crate::constants::timing;
use crate::errors::CameraError;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Receives frames from the loop
///
/// Callbacks run on the ticking thread after the device lock is released. They
/// may query the loop and the settings controller, but must return quickly and
/// must not swap or reconnect the backend.
pub trait FrameConsumer: Send + Sync {
    /// New frame for this tick
    fn on_frame(&self, frame: &Arc<Frame>);

    /// The device is gone; stop showing the last frame
    fn on_disconnected(&self) {}
}

/// Handle returned by [`FrameAcquisitionLoop::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No backend, or nobody needs frames
    Idle,
    /// Loop is paused
    Paused,
    /// Frame stored and delivered
    Delivered,
    /// Read timed out; previous frame kept
    Dropped,
    /// Device vanished; backend closed
    Disconnected,
}

/// Loop counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopStats {
    pub delivered: u64,
    pub dropped: u64,
    pub idle: u64,
    /// Delivered frames per second over the last full window
    pub fps: f64,
}

struct StatsState {
    stats: LoopStats,
    window_start: Instant,
    window_frames: u64,
}

impl StatsState {
    fn new() -> Self {
        Self {
            stats: LoopStats::default(),
            window_start: Instant::now(),
            window_frames: 0,
        }
    }

    fn record_delivered(&mut self) {
        self.stats.delivered += 1;
        self.window_frames += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed >= timing::FPS_WINDOW {
            self.stats.fps = self.window_frames as f64 / elapsed.as_secs_f64();
            self.window_start = Instant::now();
            self.window_frames = 0;
        }
    }
}

#[derive(Default)]
struct ActiveDevice {
    backend: Option<CameraBackend>,
    /// Configuration of the last successful open
    config: Option<CameraConfig>,
}

struct Shared {
    sources: DeviceSources,
    /// Held for a whole tick; taken before `device`
    tick_gate: Mutex<()>,
    device: Mutex<ActiveDevice>,
    latest: Mutex<Option<Arc<Frame>>>,
    consumers: Mutex<Vec<(SubscriptionId, Arc<dyn FrameConsumer>)>>,
    next_id: AtomicU64,
    capture_holds: AtomicUsize,
    paused: AtomicBool,
    state: watch::Sender<ConnectionState>,
    stats: Mutex<StatsState>,
}

impl Shared {
    fn publish(&self, new_state: ConnectionState) {
        self.state.send_if_modified(|state| {
            if *state == new_state {
                false
            } else {
                info!(from = %*state, to = %new_state, "Camera connection state changed");
                *state = new_state;
                true
            }
        });
    }
}

/// Single shared poller feeding every frame consumer
///
/// Cloning yields another handle to the same loop.
#[derive(Clone)]
pub struct FrameAcquisitionLoop {
    shared: Arc<Shared>,
}

/// Keeps the loop reading while alive, even with no subscribers
pub struct CaptureHold {
    shared: Arc<Shared>,
}

impl Drop for CaptureHold {
    fn drop(&mut self) {
        self.shared.capture_holds.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FrameAcquisitionLoop {
    pub fn new(sources: DeviceSources) -> Self {
        let (state, _) = watch::channel(ConnectionState::Closed);
        Self {
            shared: Arc::new(Shared {
                sources,
                tick_gate: Mutex::new(()),
                device: Mutex::new(ActiveDevice::default()),
                latest: Mutex::new(None),
                consumers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                capture_holds: AtomicUsize::new(0),
                paused: AtomicBool::new(false),
                state,
                stats: Mutex::new(StatsState::new()),
            }),
        }
    }

    pub fn sources(&self) -> &DeviceSources {
        &self.shared.sources
    }

    // ===== Consumers =====

    pub fn subscribe(&self, consumer: Arc<dyn FrameConsumer>) -> SubscriptionId {
        let id = SubscriptionId(self.shared.next_id.fetch_add(1, Ordering::SeqCst));
        lock(&self.shared.consumers).push((id, consumer));
        debug!(id = id.0, "Consumer subscribed");
        id
    }

    /// Returns `false` when the id was not subscribed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut consumers = lock(&self.shared.consumers);
        let before = consumers.len();
        consumers.retain(|(existing, _)| *existing != id);
        let removed = consumers.len() != before;
        if removed {
            debug!(id = id.0, "Consumer unsubscribed");
        }
        removed
    }

    pub fn consumer_count(&self) -> usize {
        lock(&self.shared.consumers).len()
    }

    pub fn hold_for_capture(&self) -> CaptureHold {
        self.shared.capture_holds.fetch_add(1, Ordering::SeqCst);
        CaptureHold {
            shared: Arc::clone(&self.shared),
        }
    }

    // ===== State =====

    pub fn pause(&self) {
        if !self.shared.paused.swap(true, Ordering::SeqCst) {
            info!("Acquisition paused");
        }
    }

    pub fn resume(&self) {
        if self.shared.paused.swap(false, Ordering::SeqCst) {
            info!("Acquisition resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Receiver that observes every connection state change
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Most recent frame, `None` before the first frame or after a disconnect
    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        lock(&self.shared.latest).clone()
    }

    pub fn stats(&self) -> LoopStats {
        lock(&self.shared.stats).stats
    }

    /// Configuration the active backend was opened with
    pub fn current_config(&self) -> Option<CameraConfig> {
        let device = lock(&self.shared.device);
        device.backend.as_ref().and(device.config)
    }

    /// Configuration of the last successful open, kept across a disconnect
    pub fn last_config(&self) -> Option<CameraConfig> {
        lock(&self.shared.device).config
    }

    pub fn is_active(&self) -> bool {
        lock(&self.shared.device).backend.is_some()
    }

    // ===== Backend lifecycle =====

    /// Replace the active backend with one opened for `config`
    ///
    /// Waits for any in-flight tick, closes the old backend (close errors are
    /// ignored) and opens the new one. On failure no backend is active.
    pub fn swap(&self, config: CameraConfig) -> Result<(), CameraError> {
        let _gate = lock(&self.shared.tick_gate);
        let mut device = lock(&self.shared.device);

        if let Some(mut old) = device.backend.take() {
            debug!("Closing previous backend for swap");
            old.close();
        }

        match CameraBackend::open_with(&config, &self.shared.sources) {
            Ok(backend) => {
                device.backend = Some(backend);
                device.config = Some(config);
                drop(device);
                self.shared.publish(ConnectionState::Connected);
                info!(config = %config, "Backend swapped");
                Ok(())
            }
            Err(e) => {
                drop(device);
                *lock(&self.shared.latest) = None;
                self.shared.publish(ConnectionState::Closed);
                warn!(config = %config, error = %e, "Backend swap failed");
                Err(e)
            }
        }
    }

    /// Reopen the last configuration after a disconnect
    pub fn reconnect(&self) -> Result<(), CameraError> {
        let config = self.last_config().ok_or(CameraError::NotOpen)?;
        info!(config = %config, "Reconnecting camera");
        self.swap(config)
    }

    /// Close the active backend
    pub fn close(&self) {
        if let Some(mut backend) = lock(&self.shared.device).backend.take() {
            backend.close();
        }
        *lock(&self.shared.latest) = None;
        self.shared.publish(ConnectionState::Closed);
    }

    /// Run `f` against the active backend, serialized with ticks
    ///
    /// `f` also receives the stored configuration so in-place changes can be
    /// recorded alongside the device call.
    pub fn with_backend<R>(
        &self,
        f: impl FnOnce(&mut CameraBackend, &mut CameraConfig) -> R,
    ) -> Result<R, CameraError> {
        let mut guard = lock(&self.shared.device);
        let ActiveDevice { backend, config } = &mut *guard;
        match (backend.as_mut(), config.as_mut()) {
            (Some(backend), Some(config)) => Ok(f(backend, config)),
            _ => Err(CameraError::NotOpen),
        }
    }

    // ===== Ticking =====

    /// Perform one acquisition step
    pub fn tick(&self) -> TickOutcome {
        if self.is_paused() {
            return TickOutcome::Paused;
        }

        let _gate = lock(&self.shared.tick_gate);
        let mut device = lock(&self.shared.device);
        let Some(backend) = device.backend.as_mut() else {
            lock(&self.shared.stats).stats.idle += 1;
            return TickOutcome::Idle;
        };

        let consumers: Vec<Arc<dyn FrameConsumer>> = lock(&self.shared.consumers)
            .iter()
            .map(|(_, consumer)| Arc::clone(consumer))
            .collect();
        if consumers.is_empty() && self.shared.capture_holds.load(Ordering::SeqCst) == 0 {
            lock(&self.shared.stats).stats.idle += 1;
            return TickOutcome::Idle;
        }

        match backend.read_frame() {
            Ok(frame) => {
                drop(device);
                let frame = Arc::new(frame);
                *lock(&self.shared.latest) = Some(Arc::clone(&frame));

                let delivered = {
                    let mut stats = lock(&self.shared.stats);
                    stats.record_delivered();
                    stats.stats.delivered
                };
                if delivered % timing::FRAME_LOG_INTERVAL == 0 {
                    debug!(
                        delivered,
                        sequence = frame.sequence,
                        width = frame.width,
                        height = frame.height,
                        consumers = consumers.len(),
                        "Frame delivered"
                    );
                }

                for consumer in &consumers {
                    consumer.on_frame(&frame);
                }
                TickOutcome::Delivered
            }
            Err(CameraError::CaptureTimeout) => {
                let dropped = {
                    let mut stats = lock(&self.shared.stats);
                    stats.stats.dropped += 1;
                    stats.stats.dropped
                };
                debug!(dropped, "Frame dropped");
                TickOutcome::Dropped
            }
            Err(e) => {
                warn!(error = %e, "Camera lost, closing backend");
                if let Some(mut backend) = device.backend.take() {
                    backend.close();
                }
                drop(device);
                *lock(&self.shared.latest) = None;
                self.shared.publish(ConnectionState::Lost);
                for consumer in &consumers {
                    consumer.on_disconnected();
                }
                TickOutcome::Disconnected
            }
        }
    }
}

/// Background thread calling [`FrameAcquisitionLoop::tick`] on a fixed interval
///
/// The thread stops when the driver is dropped.
pub struct TickDriver {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl TickDriver {
    /// Start ticking `frame_loop` every [`timing::TICK_INTERVAL`]
    pub fn start(name: &str, frame_loop: FrameAcquisitionLoop) -> Self {
        Self::start_with_interval(name, frame_loop, timing::TICK_INTERVAL)
    }

    pub fn start_with_interval(
        name: &str,
        frame_loop: FrameAcquisitionLoop,
        interval: Duration,
    ) -> Self {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, interval_ms = interval.as_millis() as u64, "Starting tick driver");

        let thread_handle = thread::spawn(move || {
            debug!(name = %name_clone, "Tick thread started");

            while !stop_signal_clone.load(Ordering::SeqCst) {
                let started = Instant::now();
                frame_loop.tick();
                if let Some(rest) = interval.checked_sub(started.elapsed()) {
                    thread::sleep(rest);
                }
            }

            info!(name = %name_clone, "Tick thread exiting");
        });

        Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the thread to stop without waiting
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting tick driver stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the thread and wait for it to finish
    pub fn stop(&mut self) {
        self.request_stop();
        if let Some(handle) = self.thread_handle.take()
            && let Err(e) = handle.join()
        {
            warn!(name = %self.name, "Tick thread panicked: {:?}", e);
        }
    }
}

impl Drop for TickDriver {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "TickDriver dropped, stopping thread");
            self.stop();
        }
    }
}
