// SPDX-License-Identifier: GPL-3.0-only

//! Dataset capture store
//!
//! Owns the counters and gallery for one storage root. Captures and reconciles
//! are single-flighted by one lock, so a scan never races a capture.

use super::encoding::{decode_thumbnail, encode_jpeg};
use super::gallery::{Gallery, GalleryEntry};
use super::naming::{is_sample_file, partial_path, sanitize_category, timestamp, unique_sample_path};
use super::{Label, Sample, Statistics};
use crate::backends::camera::Frame;
use crate::constants::dataset;
use crate::errors::StorageError;
use chrono::{DateTime, Local};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tracing::{debug, info, warn};

struct StoreState {
    reconciled: bool,
    stats: Statistics,
    gallery: Gallery,
}

pub struct DatasetCaptureStore {
    root: PathBuf,
    jpeg_quality: u8,
    state: Mutex<StoreState>,
}

struct ScannedSample {
    modified: SystemTime,
    filename: String,
    path: PathBuf,
    label: Label,
}

impl DatasetCaptureStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_quality(root, dataset::DEFAULT_JPEG_QUALITY)
    }

    pub fn with_quality(root: impl Into<PathBuf>, jpeg_quality: u8) -> Self {
        Self {
            root: root.into(),
            jpeg_quality,
            state: Mutex::new(StoreState {
                reconciled: false,
                stats: Statistics::default(),
                gallery: Gallery::new(dataset::GALLERY_CAPACITY),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counters, reconciling on first access
    pub fn stats(&self) -> Statistics {
        let mut state = self.lock();
        self.ensure_reconciled(&mut state);
        state.stats
    }

    /// Gallery entries newest first, reconciling on first access
    pub fn gallery(&self) -> Vec<GalleryEntry> {
        let mut state = self.lock();
        self.ensure_reconciled(&mut state);
        state.gallery.to_vec()
    }

    /// Persist `frame` as a labeled sample
    ///
    /// All-or-nothing: on error nothing is left on disk and neither the counters
    /// nor the gallery change.
    pub fn capture(
        &self,
        frame: &Frame,
        label: Label,
        category: Option<&str>,
    ) -> Result<Sample, StorageError> {
        self.capture_at(frame, label, category, Local::now())
    }

    /// Like [`capture`](Self::capture) with an explicit wall-clock time
    pub fn capture_at(
        &self,
        frame: &Frame,
        label: Label,
        category: Option<&str>,
        now: DateTime<Local>,
    ) -> Result<Sample, StorageError> {
        let mut state = self.lock();
        self.ensure_reconciled(&mut state);

        let category = match label {
            Label::Ok => None,
            Label::NotOk => category.and_then(sanitize_category),
        };

        let dir = self.root.join(label.dir_name());
        fs::create_dir_all(&dir).map_err(|e| StorageError::CreateDir {
            path: dir.clone(),
            reason: e.to_string(),
        })?;

        let path = unique_sample_path(&dir, label, category.as_deref(), &timestamp(&now));
        let jpeg = encode_jpeg(frame, self.jpeg_quality)?;
        write_atomically(&path, &jpeg)?;

        state.stats.record(label);
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        state.gallery.push_front(GalleryEntry {
            filename: filename.clone(),
            path: path.clone(),
            label,
            thumbnail: Some(frame.downscaled(dataset::THUMBNAIL_MAX_EDGE)),
        });

        info!(
            file = %filename,
            %label,
            category = category.as_deref().unwrap_or(""),
            total = state.stats.total,
            "Sample captured"
        );

        Ok(Sample {
            path: std::path::absolute(&path).unwrap_or(path),
            label,
            category,
            captured_at: now,
        })
    }

    /// Encode and write on the blocking pool
    pub async fn capture_in_background(
        self: Arc<Self>,
        frame: Arc<Frame>,
        label: Label,
        category: Option<String>,
    ) -> Result<Sample, StorageError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || self.capture(&frame, label, category.as_deref()))
            .await
            .map_err(|e| StorageError::Write {
                path: root,
                reason: format!("capture task failed: {}", e),
            })?
    }

    /// Rescan storage, rebuilding counters and gallery
    pub fn reconcile(&self) -> Statistics {
        let mut state = self.lock();
        self.reconcile_locked(&mut state);
        state.stats
    }

    fn ensure_reconciled(&self, state: &mut StoreState) {
        if !state.reconciled {
            self.reconcile_locked(state);
        }
    }

    fn reconcile_locked(&self, state: &mut StoreState) {
        let mut samples = Vec::new();
        let mut stats = Statistics::default();

        for label in Label::ALL {
            let dir = self.root.join(label.dir_name());
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    debug!(dir = %dir.display(), error = %e, "No samples directory");
                    continue;
                }
            };

            for entry in entries.flatten() {
                let path = entry.path();
                if !is_sample_file(&path) {
                    continue;
                }
                let Ok(metadata) = entry.metadata() else {
                    continue;
                };
                if !metadata.is_file() {
                    continue;
                }
                stats.record(label);
                samples.push(ScannedSample {
                    modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                    filename: entry.file_name().to_string_lossy().to_string(),
                    path,
                    label,
                });
            }
        }

        // Newest first; equal times fall back to the name, which embeds the timestamp
        samples.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.filename.cmp(&a.filename))
        });

        let entries = samples
            .into_iter()
            .take(dataset::GALLERY_CAPACITY)
            .map(|sample| GalleryEntry {
                thumbnail: decode_thumbnail(&sample.path, dataset::THUMBNAIL_MAX_EDGE),
                filename: sample.filename,
                path: sample.path,
                label: sample.label,
            });
        state.gallery.replace(entries);
        state.stats = stats;
        state.reconciled = true;

        info!(
            root = %self.root.display(),
            total = stats.total,
            ok = stats.ok,
            not_ok = stats.not_ok,
            gallery = state.gallery.len(),
            "Dataset reconciled"
        );
    }
}

/// Write to a hidden partial file, then rename into place
fn write_atomically(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    let partial = partial_path(path);
    let result = File::create(&partial)
        .and_then(|mut file| {
            file.write_all(data)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&partial, path));

    result.map_err(|e| {
        if let Err(cleanup) = fs::remove_file(&partial)
            && cleanup.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %partial.display(), error = %cleanup, "Failed to remove partial sample");
        }
        StorageError::Write {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })
}
