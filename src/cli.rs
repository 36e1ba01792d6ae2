// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for station operations
//!
//! This module provides command-line functionality for:
//! - Listing cameras
//! - Running the live feed
//! - Capturing labeled samples
//! - Inspecting the dataset
//! - Applying camera settings

use inspection_station::app::{ApplyOutcome, InspectionStation, SettingsChange};
use inspection_station::backends::camera::{
    CameraKind, ConnectionState, DeviceSources, Frame, FrameConsumer, Resolution,
    SimulatedDevice, SimulatedSource,
};
use inspection_station::config::Config;
use inspection_station::constants::formats;
use inspection_station::dataset::{DatasetCaptureStore, Label};
use inspection_station::errors::AppResult;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Loaded configuration plus global flags
pub struct Context {
    config: Config,
    config_path: Option<PathBuf>,
    simulate: bool,
}

impl Context {
    pub fn load(
        config_path: Option<PathBuf>,
        storage: Option<PathBuf>,
        simulate: bool,
    ) -> AppResult<Self> {
        let config_path = config_path.or_else(Config::default_path);
        let mut config = match &config_path {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(storage) = storage {
            config.storage_root = storage;
        }
        Ok(Self {
            config,
            config_path,
            simulate,
        })
    }

    fn sources(&self) -> DeviceSources {
        if self.simulate {
            DeviceSources::simulated(
                SimulatedSource::new(CameraKind::Usb)
                    .with_device(SimulatedDevice::new("Simulated Webcam")),
                SimulatedSource::new(CameraKind::Depth)
                    .with_device(SimulatedDevice::new("Simulated Depth Camera").fixed_focus()),
            )
        } else {
            DeviceSources::v4l2()
        }
    }

    fn station(&self) -> InspectionStation {
        InspectionStation::new(&self.config, self.sources())
    }
}

/// Counts frames and remembers disconnects
#[derive(Default)]
struct FeedMonitor {
    frames: AtomicU64,
    disconnected: AtomicBool,
}

impl FrameConsumer for FeedMonitor {
    fn on_frame(&self, _frame: &Arc<Frame>) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.disconnected.store(false, Ordering::Relaxed);
    }

    fn on_disconnected(&self) {
        self.disconnected.store(true, Ordering::Relaxed);
    }
}

/// List cameras of every kind
pub fn list_cameras(context: &Context) -> CliResult {
    let sources = context.sources();
    let mut found = false;

    for kind in CameraKind::ALL {
        let devices = sources.for_kind(kind).enumerate();
        if devices.is_empty() {
            continue;
        }
        found = true;
        println!("{} cameras:", kind);
        for device in &devices {
            println!("  [{}] {}", device.index, device);
        }
        println!();
    }

    if !found {
        println!("No cameras found.");
    }
    Ok(())
}

/// Run the live feed, printing the measured frame rate
pub fn preview(context: &Context, seconds: u64) -> CliResult {
    let station = context.station();
    station.start()?;
    println!("Camera: {}", station.settings().config());

    let monitor = Arc::new(FeedMonitor::default());
    let subscription = station.subscribe(monitor.clone());
    let mut driver = station.spawn_driver();

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    println!("Previewing... (press Ctrl+C to stop early)");
    let start = Instant::now();
    let target = Duration::from_secs(seconds);
    let mut last_reconnect: Option<Instant> = None;

    while start.elapsed() < target {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping early...");
            break;
        }

        if station.frame_loop().connection_state() == ConnectionState::Lost
            && last_reconnect.is_none_or(|at| at.elapsed() >= Duration::from_secs(1))
        {
            last_reconnect = Some(Instant::now());
            if let Err(e) = station.reconnect() {
                warn!(error = %e, "Reconnect failed");
            }
        }

        let stats = station.frame_loop().stats();
        let status = if monitor.disconnected.load(Ordering::Relaxed) {
            "disconnected".to_string()
        } else {
            format!("{:.1} fps", stats.fps)
        };
        print!(
            "\rFrames: {}  dropped: {}  {}   ",
            monitor.frames.load(Ordering::Relaxed),
            stats.dropped,
            status
        );
        std::io::Write::flush(&mut std::io::stdout())?;

        std::thread::sleep(Duration::from_millis(100));
    }
    println!();

    driver.stop();
    station.unsubscribe(subscription);
    station.frame_loop().close();
    Ok(())
}

/// Wait for a frame newer than `after`
fn wait_for_frame(
    station: &InspectionStation,
    after: Option<u64>,
    timeout: Duration,
) -> Option<Arc<Frame>> {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if let Some(frame) = station.frame_loop().latest_frame()
            && after.is_none_or(|sequence| frame.sequence > sequence)
        {
            return Some(frame);
        }
        std::thread::sleep(Duration::from_millis(16));
    }
    None
}

/// Capture `count` labeled samples from consecutive frames
pub fn capture(context: &Context, label: Label, category: Option<String>, count: u32) -> CliResult {
    let station = context.station();
    station.start()?;
    println!("Camera: {}", station.settings().config());

    let _hold = station.hold_for_capture();
    let mut driver = station.spawn_driver();

    // Let exposure settle before the first sample
    let mut last = wait_for_frame(&station, None, Duration::from_secs(5))
        .ok_or("Failed to capture frame from camera")?;
    std::thread::sleep(Duration::from_millis(500));

    let rt = tokio::runtime::Runtime::new()?;
    for _ in 0..count {
        last = wait_for_frame(&station, Some(last.sequence), Duration::from_secs(2))
            .ok_or("Camera stopped delivering frames")?;
        let sample = rt.block_on(station.capture_async(label, category.clone()))?;
        println!("Saved {}: {}", sample.label, sample.path.display());
    }

    driver.stop();
    station.frame_loop().close();
    println!("Dataset: {}", station.statistics());
    Ok(())
}

/// Print dataset counters and the most recent samples
pub fn show_stats(context: &Context) -> CliResult {
    let store = DatasetCaptureStore::with_quality(
        context.config.storage_root.clone(),
        context.config.jpeg_quality,
    );
    println!("Dataset: {}", context.config.storage_root.display());
    println!("{}", store.stats());

    let gallery = store.gallery();
    if !gallery.is_empty() {
        println!();
        println!("Most recent:");
        for entry in gallery.iter().take(10) {
            println!("  {:<6} {}", entry.label.to_string(), entry.filename);
        }
    }
    Ok(())
}

/// Turn the `set` flags into changes, in application order
pub fn collect_changes(
    kind: Option<CameraKind>,
    device: Option<u32>,
    resolution: Option<Resolution>,
    fps: Option<u32>,
    autofocus: Option<bool>,
    focus: Option<u8>,
) -> Vec<SettingsChange> {
    [
        kind.map(SettingsChange::DeviceKind),
        device.map(SettingsChange::DeviceIndex),
        resolution.map(SettingsChange::Resolution),
        fps.map(SettingsChange::Fps),
        focus.map(SettingsChange::ManualFocus),
        autofocus.map(SettingsChange::Autofocus),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Apply changes to the configured camera and persist the result
pub fn apply_settings(context: &Context, changes: &[SettingsChange]) -> CliResult {
    if changes.is_empty() {
        println!("Camera: {}", context.config.camera);
        return Ok(());
    }

    let station = context.station();
    let camera = match station.start() {
        Ok(_) => {
            for (change, result) in changes.iter().zip(station.apply_batch(changes)) {
                match result {
                    Ok(ApplyOutcome::Unsupported) => {
                        println!("  {}: not supported by this camera", change)
                    }
                    Ok(outcome) => println!("  {}: {:?}", change, outcome),
                    Err(e) => println!("  {}: failed ({})", change, e),
                }
            }
            station.frame_loop().close();
            station.settings().config()
        }
        Err(e) => {
            println!("Camera unavailable ({}); saving without applying", e);
            let mut camera = context.config.camera;
            for change in changes {
                if let SettingsChange::Fps(fps) = change
                    && !formats::SUPPORTED_FRAMERATES.contains(fps)
                {
                    return Err(format!("{} fps is not supported", fps).into());
                }
                camera = change.applied_to(&camera);
            }
            camera
        }
    };

    let config = Config {
        camera,
        ..context.config.clone()
    };
    match &context.config_path {
        Some(path) => {
            config.save(path)?;
            println!("Camera: {}", config.camera);
            println!("Saved to {}", path.display());
        }
        None => println!("No config directory; settings not saved"),
    }
    Ok(())
}
