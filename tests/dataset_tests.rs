// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for dataset capture and reconciliation

use chrono::{Duration as ChronoDuration, Local};
use inspection_station::backends::camera::Frame;
use inspection_station::dataset::{DatasetCaptureStore, Label, Statistics};
use inspection_station::errors::StorageError;
use std::fs;
use std::sync::Arc;

fn frame(shade: u8) -> Frame {
    Frame::new(320, 240, 3, vec![shade; 320 * 240 * 3])
}

fn sample_names(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[test]
fn test_mixed_session_counts_and_gallery_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = DatasetCaptureStore::new(dir.path());
    let start = Local::now();

    for i in 0..3 {
        store
            .capture_at(&frame(100), Label::Ok, None, start + ChronoDuration::seconds(i))
            .unwrap();
    }
    for i in 3..5 {
        store
            .capture_at(
                &frame(30),
                Label::NotOk,
                Some("Crack"),
                start + ChronoDuration::seconds(i),
            )
            .unwrap();
    }

    assert_eq!(
        store.stats(),
        Statistics {
            total: 5,
            ok: 3,
            not_ok: 2
        }
    );

    let gallery = store.gallery();
    assert_eq!(gallery.len(), 5);
    assert_eq!(gallery[0].label, Label::NotOk);
    assert_eq!(gallery[1].label, Label::NotOk);
    assert_eq!(gallery[2].label, Label::Ok);
    assert!(gallery[0].filename.starts_with("notok_crack_"));
    assert!(gallery.iter().all(|e| e.thumbnail.is_some()));

    assert_eq!(sample_names(&dir.path().join("ok")).len(), 3);
    assert_eq!(sample_names(&dir.path().join("not_ok")).len(), 2);
}

#[test]
fn test_failed_write_leaves_state_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let store = DatasetCaptureStore::new(dir.path());
    store.capture(&frame(80), Label::NotOk, Some("Scratch")).unwrap();
    let before = store.stats();

    // A plain file where the directory should be
    fs::write(dir.path().join("ok"), b"in the way").unwrap();

    let err = store.capture(&frame(80), Label::Ok, None).unwrap_err();
    assert!(matches!(err, StorageError::CreateDir { .. }));
    assert_eq!(store.stats(), before);
    assert_eq!(store.gallery().len(), 1);
    assert_eq!(sample_names(&dir.path().join("not_ok")).len(), 1);
}

#[test]
fn test_reconcile_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = DatasetCaptureStore::new(dir.path());
        store.capture(&frame(10), Label::Ok, None).unwrap();
        store.capture(&frame(20), Label::NotOk, Some("Dent")).unwrap();
        store.capture(&frame(30), Label::NotOk, None).unwrap();
    }

    let store = DatasetCaptureStore::new(dir.path());
    let first = store.reconcile();
    let first_gallery: Vec<String> = store.gallery().into_iter().map(|e| e.filename).collect();
    let second = store.reconcile();
    let second_gallery: Vec<String> = store.gallery().into_iter().map(|e| e.filename).collect();

    assert_eq!(first, second);
    assert_eq!(first_gallery, second_gallery);
    assert_eq!(
        first,
        Statistics {
            total: 3,
            ok: 1,
            not_ok: 2
        }
    );
}

#[test]
fn test_counts_come_from_disk_on_restart() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("not_ok")).unwrap();
    let seeded = DatasetCaptureStore::new(dir.path());
    seeded.capture(&frame(50), Label::NotOk, Some("Burr")).unwrap();
    drop(seeded);

    // Foreign files are not samples
    fs::write(dir.path().join("not_ok/notes.txt"), b"shift 2").unwrap();

    let store = DatasetCaptureStore::new(dir.path());
    assert_eq!(store.stats().not_ok, 1);
    store.capture(&frame(60), Label::Ok, None).unwrap();
    assert_eq!(store.stats().total, 2);
}

#[test]
fn test_gallery_evicts_oldest_past_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let store = DatasetCaptureStore::new(dir.path());
    let start = Local::now();

    let first = store
        .capture_at(&frame(1), Label::Ok, None, start)
        .unwrap();
    for i in 1..=50 {
        store
            .capture_at(
                &frame(2),
                Label::Ok,
                None,
                start + ChronoDuration::milliseconds(i),
            )
            .unwrap();
    }

    let gallery = store.gallery();
    assert_eq!(gallery.len(), 50);
    let first_name = first.path.file_name().unwrap().to_string_lossy().to_string();
    assert!(gallery.iter().all(|e| e.filename != first_name));
    assert_eq!(store.stats().ok, 51);
    assert!(first.path.exists());
}

#[test]
fn test_category_sanitized_and_ignored_for_ok() {
    let dir = tempfile::tempdir().unwrap();
    let store = DatasetCaptureStore::new(dir.path());

    let bad = store
        .capture(&frame(70), Label::NotOk, Some("  Foreign Object / Debris "))
        .unwrap();
    let name = bad.path.file_name().unwrap().to_string_lossy().to_string();
    assert!(!name.contains(' '));
    assert!(!name.contains('/'));
    assert!(name.starts_with("notok_"));

    let ok = store.capture(&frame(70), Label::Ok, Some("Crack")).unwrap();
    assert_eq!(ok.category, None);
    assert!(!ok.path.to_string_lossy().contains("crack"));
}

#[tokio::test]
async fn test_capture_in_background() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(DatasetCaptureStore::new(dir.path()));

    let sample = Arc::clone(&store)
        .capture_in_background(Arc::new(frame(90)), Label::NotOk, Some("Warp".to_string()))
        .await
        .unwrap();

    assert!(sample.path.is_absolute());
    assert!(sample.path.exists());
    assert_eq!(sample.category.as_deref(), Some("warp"));
    assert_eq!(store.stats().not_ok, 1);
}
