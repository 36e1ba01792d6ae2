// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use inspection_station::backends::camera::{CameraKind, Resolution};
use inspection_station::errors::ConfigError;
use inspection_station::Config;
use std::fs;

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!(config.camera.kind, CameraKind::Usb);
    assert_eq!(config.camera.resolution, Resolution::Hd);
    assert_eq!(config.camera.fps, 30);
    assert_eq!(config.storage_root, std::path::PathBuf::from("storage/dataset"));
}

#[test]
fn test_missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(&dir.path().join("absent.json")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/config.json");

    let mut config = Config::default();
    config.camera.kind = CameraKind::Depth;
    config.camera.resolution = Resolution::Vga;
    config.camera.autofocus = true;
    config.jpeg_quality = 80;
    config.save(&path).unwrap();

    assert_eq!(Config::load(&path).unwrap(), config);
}

#[test]
fn test_partial_file_fills_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, r#"{ "camera": { "fps": 60, "resolution": "1920x1080" } }"#).unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.camera.fps, 60);
    assert_eq!(config.camera.resolution, Resolution::FullHd);
    assert_eq!(config.camera.kind, CameraKind::Usb);
    assert_eq!(config.jpeg_quality, Config::default().jpeg_quality);
}

#[test]
fn test_malformed_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, "{ not json").unwrap();
    assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
}
