// SPDX-License-Identifier: GPL-3.0-only

//! End-to-end tests for the inspection station facade

use inspection_station::backends::camera::{
    CameraKind, ConnectionState, DeviceSources, SimulatedDevice, SimulatedSource,
};
use inspection_station::errors::CaptureError;
use inspection_station::{ApplyOutcome, Config, InspectionStation, Label, SettingsChange};
use std::thread;
use std::time::{Duration, Instant};

fn station(dir: &std::path::Path) -> (InspectionStation, SimulatedSource) {
    let usb = SimulatedSource::new(CameraKind::Usb).with_device(SimulatedDevice::new("Bench Cam"));
    let depth = SimulatedSource::new(CameraKind::Depth)
        .with_device(SimulatedDevice::new("Depth Cam").fixed_focus());
    let config = Config {
        storage_root: dir.to_path_buf(),
        ..Config::default()
    };
    (
        InspectionStation::new(&config, DeviceSources::simulated(usb.clone(), depth)),
        usb,
    )
}

#[test]
fn test_capture_before_any_frame() {
    let dir = tempfile::tempdir().unwrap();
    let (station, _usb) = station(dir.path());
    station.start().unwrap();

    assert!(matches!(
        station.capture(Label::Ok, None),
        Err(CaptureError::NoFrameAvailable)
    ));
    assert_eq!(station.statistics().total, 0);
}

#[test]
fn test_capture_latest_frame() {
    let dir = tempfile::tempdir().unwrap();
    let (station, _usb) = station(dir.path());
    assert_eq!(station.start(), Ok(ApplyOutcome::Reopened));

    let _hold = station.hold_for_capture();
    station.frame_loop().tick();

    let sample = station.capture(Label::NotOk, Some("Crack")).unwrap();
    assert!(sample.path.starts_with(dir.path().join("not_ok")));
    assert_eq!(station.statistics().not_ok, 1);
    assert_eq!(station.gallery()[0].label, Label::NotOk);
}

#[test]
fn test_capture_after_disconnect_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (station, usb) = station(dir.path());
    station.start().unwrap();
    let _hold = station.hold_for_capture();
    station.frame_loop().tick();

    usb.unplug(0);
    station.frame_loop().tick();
    assert_eq!(station.frame_loop().connection_state(), ConnectionState::Lost);
    assert!(matches!(
        station.capture(Label::Ok, None),
        Err(CaptureError::Disconnected)
    ));

    usb.replug(0);
    station.reconnect().unwrap();
    station.frame_loop().tick();
    assert!(station.capture(Label::Ok, None).is_ok());
}

#[test]
fn test_driver_feeds_capture() {
    let dir = tempfile::tempdir().unwrap();
    let (station, _usb) = station(dir.path());
    station.start().unwrap();
    let _hold = station.hold_for_capture();
    let mut driver = station.spawn_driver();

    let start = Instant::now();
    while station.frame_loop().latest_frame().is_none() {
        assert!(start.elapsed() < Duration::from_secs(5));
        thread::sleep(Duration::from_millis(5));
    }
    station.capture(Label::Ok, None).unwrap();

    // Settings changes interleave with the running driver
    station
        .apply(SettingsChange::Resolution(inspection_station::Resolution::Vga))
        .unwrap();
    driver.stop();
    assert!(!driver.is_running());
    assert_eq!(station.settings().config().resolution, inspection_station::Resolution::Vga);
}

#[test]
fn test_list_devices_per_kind() {
    let dir = tempfile::tempdir().unwrap();
    let (station, usb) = station(dir.path());
    usb.add_device(SimulatedDevice::new("Second Cam"));

    let webcams = station.list_devices(CameraKind::Usb);
    assert_eq!(webcams.len(), 2);
    assert_eq!(webcams[1].name, "Second Cam");
    assert_eq!(station.list_devices(CameraKind::Depth).len(), 1);
}

#[tokio::test]
async fn test_capture_async() {
    let dir = tempfile::tempdir().unwrap();
    let (station, _usb) = station(dir.path());
    station.start().unwrap();
    let _hold = station.hold_for_capture();
    station.frame_loop().tick();

    let sample = station
        .capture_async(Label::Ok, None)
        .await
        .unwrap();
    assert!(sample.path.exists());
    assert_eq!(station.statistics().ok, 1);
}
