// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the frame acquisition loop

use inspection_station::backends::camera::{
    CameraConfig, CameraKind, ConnectionState, DeviceSources, Frame, FrameAcquisitionLoop,
    FrameConsumer, Resolution, SimulatedDevice, SimulatedSource, TickOutcome,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Records every frame it receives
#[derive(Default)]
struct Recorder {
    frames: Mutex<Vec<Arc<Frame>>>,
    disconnects: Mutex<u32>,
}

impl Recorder {
    fn frames(&self) -> Vec<Arc<Frame>> {
        self.frames.lock().unwrap().clone()
    }
}

impl FrameConsumer for Recorder {
    fn on_frame(&self, frame: &Arc<Frame>) {
        self.frames.lock().unwrap().push(Arc::clone(frame));
    }

    fn on_disconnected(&self) {
        *self.disconnects.lock().unwrap() += 1;
    }
}

fn loop_with(device: SimulatedDevice) -> (FrameAcquisitionLoop, SimulatedSource) {
    let usb = SimulatedSource::new(CameraKind::Usb).with_device(device);
    let frame_loop = FrameAcquisitionLoop::new(DeviceSources::simulated(
        usb.clone(),
        SimulatedSource::new(CameraKind::Depth),
    ));
    (frame_loop, usb)
}

fn full_hd() -> CameraConfig {
    CameraConfig {
        resolution: Resolution::FullHd,
        fps: 30,
        ..CameraConfig::default()
    }
}

#[test]
fn test_hundred_ticks_deliver_hundred_frames() {
    let (frame_loop, _usb) = loop_with(SimulatedDevice::new("Bench Cam"));
    frame_loop.swap(full_hd()).unwrap();

    let recorder = Arc::new(Recorder::default());
    frame_loop.subscribe(recorder.clone());

    for _ in 0..100 {
        assert_eq!(frame_loop.tick(), TickOutcome::Delivered);
    }

    let stats = frame_loop.stats();
    assert_eq!(stats.delivered, 100);
    assert_eq!(stats.dropped, 0);

    let frames = recorder.frames();
    assert_eq!(frames.len(), 100);
    assert!(frames.iter().all(|f| (f.width, f.height) == (1920, 1080)));
    for pair in frames.windows(2) {
        assert!(pair[1].captured_at >= pair[0].captured_at);
        assert!(pair[1].sequence > pair[0].sequence);
    }
}

#[test]
fn test_consumers_share_the_same_frame() {
    let (frame_loop, _usb) = loop_with(SimulatedDevice::new("Bench Cam"));
    frame_loop.swap(CameraConfig::default()).unwrap();

    let preview = Arc::new(Recorder::default());
    let capture = Arc::new(Recorder::default());
    frame_loop.subscribe(preview.clone());
    frame_loop.subscribe(capture.clone());

    for _ in 0..3 {
        frame_loop.tick();
    }

    let (a, b) = (preview.frames(), capture.frames());
    assert_eq!(a.len(), 3);
    for (left, right) in a.iter().zip(&b) {
        assert!(Arc::ptr_eq(left, right));
    }
    let latest = frame_loop.latest_frame().unwrap();
    assert!(Arc::ptr_eq(&latest, &a[2]));
}

#[test]
fn test_timeout_keeps_previous_frame() {
    let (frame_loop, usb) = loop_with(SimulatedDevice::new("Bench Cam"));
    frame_loop.swap(CameraConfig::default()).unwrap();
    let recorder = Arc::new(Recorder::default());
    frame_loop.subscribe(recorder.clone());

    assert_eq!(frame_loop.tick(), TickOutcome::Delivered);
    let before = frame_loop.latest_frame().unwrap();

    usb.inject_timeouts(2);
    assert_eq!(frame_loop.tick(), TickOutcome::Dropped);
    assert_eq!(frame_loop.tick(), TickOutcome::Dropped);
    assert!(Arc::ptr_eq(&frame_loop.latest_frame().unwrap(), &before));
    assert_eq!(frame_loop.connection_state(), ConnectionState::Connected);

    assert_eq!(frame_loop.tick(), TickOutcome::Delivered);
    let stats = frame_loop.stats();
    assert_eq!((stats.delivered, stats.dropped), (2, 2));
    assert_eq!(recorder.frames().len(), 2);
}

#[test]
fn test_corrupt_frame_counts_as_dropped() {
    let (frame_loop, usb) = loop_with(SimulatedDevice::new("Bench Cam"));
    frame_loop.swap(CameraConfig::default()).unwrap();
    let _hold = frame_loop.hold_for_capture();

    usb.inject_corrupt_frames(1);
    assert_eq!(frame_loop.tick(), TickOutcome::Dropped);
    assert_eq!(frame_loop.tick(), TickOutcome::Delivered);
}

#[test]
fn test_disconnect_notifies_consumers() {
    let (frame_loop, usb) = loop_with(SimulatedDevice::new("Bench Cam"));
    frame_loop.swap(CameraConfig::default()).unwrap();
    let recorder = Arc::new(Recorder::default());
    frame_loop.subscribe(recorder.clone());
    let mut state = frame_loop.watch_state();

    frame_loop.tick();
    assert!(frame_loop.latest_frame().is_some());

    usb.unplug(0);
    assert_eq!(frame_loop.tick(), TickOutcome::Disconnected);
    assert_eq!(*recorder.disconnects.lock().unwrap(), 1);
    assert!(frame_loop.latest_frame().is_none());
    assert_eq!(frame_loop.connection_state(), ConnectionState::Lost);
    assert!(state.has_changed().unwrap());
    assert_eq!(*state.borrow_and_update(), ConnectionState::Lost);
    assert!(!usb.is_held(0));

    // No backend: further ticks idle without reads
    let reads = usb.read_count();
    assert_eq!(frame_loop.tick(), TickOutcome::Idle);
    assert_eq!(usb.read_count(), reads);
}

#[test]
fn test_swap_waits_for_tick_in_progress() {
    struct Slow {
        entered: AtomicBool,
        finished: AtomicBool,
    }

    impl FrameConsumer for Slow {
        fn on_frame(&self, _frame: &Arc<Frame>) {
            self.entered.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(100));
            self.finished.store(true, Ordering::SeqCst);
        }
    }

    let (frame_loop, _usb) = loop_with(SimulatedDevice::new("Bench Cam"));
    frame_loop.swap(CameraConfig::default()).unwrap();
    let slow = Arc::new(Slow {
        entered: AtomicBool::new(false),
        finished: AtomicBool::new(false),
    });
    frame_loop.subscribe(slow.clone());

    let ticking = frame_loop.clone();
    let handle = thread::spawn(move || ticking.tick());

    let start = Instant::now();
    while !slow.entered.load(Ordering::SeqCst) {
        assert!(start.elapsed() < Duration::from_secs(5));
        thread::sleep(Duration::from_millis(1));
    }

    frame_loop
        .swap(CameraConfig {
            resolution: Resolution::Vga,
            ..CameraConfig::default()
        })
        .unwrap();
    assert!(slow.finished.load(Ordering::SeqCst));
    assert_eq!(handle.join().unwrap(), TickOutcome::Delivered);
    assert_eq!(
        frame_loop.current_config().map(|c| c.resolution),
        Some(Resolution::Vga)
    );
}

#[test]
fn test_depth_camera_warms_up_before_serving() {
    let depth = SimulatedSource::new(CameraKind::Depth)
        .with_device(SimulatedDevice::new("Depth Cam").fixed_focus());
    let frame_loop = FrameAcquisitionLoop::new(DeviceSources::simulated(
        SimulatedSource::new(CameraKind::Usb),
        depth.clone(),
    ));

    frame_loop
        .swap(CameraConfig {
            kind: CameraKind::Depth,
            ..CameraConfig::default()
        })
        .unwrap();
    assert!(depth.read_count() >= 30);

    let _hold = frame_loop.hold_for_capture();
    assert_eq!(frame_loop.tick(), TickOutcome::Delivered);
    assert_eq!(frame_loop.latest_frame().unwrap().sequence, 1);
}

#[test]
fn test_failed_swap_leaves_loop_closed() {
    let (frame_loop, _usb) = loop_with(SimulatedDevice::new("Bench Cam"));
    frame_loop.swap(CameraConfig::default()).unwrap();
    let _hold = frame_loop.hold_for_capture();
    frame_loop.tick();

    let missing = CameraConfig {
        device_index: 3,
        ..CameraConfig::default()
    };
    assert!(frame_loop.swap(missing).is_err());
    assert!(!frame_loop.is_active());
    assert!(frame_loop.latest_frame().is_none());
    assert_eq!(frame_loop.connection_state(), ConnectionState::Closed);
    assert_eq!(frame_loop.tick(), TickOutcome::Idle);
}
