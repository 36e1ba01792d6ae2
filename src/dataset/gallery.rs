// SPDX-License-Identifier: GPL-3.0-only

//! Bounded most-recent-first gallery

use super::Label;
use crate::backends::camera::Frame;
use std::collections::VecDeque;
use std::path::PathBuf;

/// Thumbnail projection of a stored sample
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub filename: String,
    pub path: PathBuf,
    pub label: Label,
    /// `None` when the stored file could not be decoded
    pub thumbnail: Option<Frame>,
}

#[derive(Debug, Clone)]
pub struct Gallery {
    entries: VecDeque<GalleryEntry>,
    capacity: usize,
}

impl Gallery {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Insert at the front, evicting the oldest entry past capacity
    pub fn push_front(&mut self, entry: GalleryEntry) -> Option<GalleryEntry> {
        self.entries.push_front(entry);
        if self.entries.len() > self.capacity {
            self.entries.pop_back()
        } else {
            None
        }
    }

    /// Replace all entries; `entries` must already be newest first
    pub fn replace(&mut self, entries: impl IntoIterator<Item = GalleryEntry>) {
        self.entries = entries.into_iter().take(self.capacity).collect();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &GalleryEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<GalleryEntry> {
        self.entries.iter().cloned().collect()
    }
}
