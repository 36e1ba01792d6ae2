// SPDX-License-Identifier: GPL-3.0-only

//! Labeled sample storage
//!
//! Samples are plain JPEG files under `<root>/ok` and `<root>/not_ok`. Counters
//! and the recent-sample gallery are derived from those directories on first
//! access and then updated with every capture.

pub mod encoding;
pub mod gallery;
pub mod naming;
pub mod store;

pub use gallery::{Gallery, GalleryEntry};
pub use store::DatasetCaptureStore;

use crate::constants::dataset;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Inspection verdict attached to a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "NOT_OK")]
    NotOk,
}

impl Label {
    pub const ALL: [Label; 2] = [Label::Ok, Label::NotOk];

    /// Directory under the storage root
    pub fn dir_name(&self) -> &'static str {
        match self {
            Label::Ok => dataset::OK_DIR,
            Label::NotOk => dataset::NOT_OK_DIR,
        }
    }

    /// Filename prefix
    pub fn prefix(&self) -> &'static str {
        match self {
            Label::Ok => dataset::OK_PREFIX,
            Label::NotOk => dataset::NOT_OK_PREFIX,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Ok => write!(f, "OK"),
            Label::NotOk => write!(f, "NOT_OK"),
        }
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "ok" | "pass" => Ok(Label::Ok),
            "not_ok" | "notok" | "nok" | "fail" => Ok(Label::NotOk),
            other => Err(format!("unknown label '{}'", other)),
        }
    }
}

/// One persisted, labeled image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub path: PathBuf,
    pub label: Label,
    /// Normalized defect category, rejected samples only
    pub category: Option<String>,
    pub captured_at: DateTime<Local>,
}

/// Sample counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total: usize,
    pub ok: usize,
    pub not_ok: usize,
}

impl Statistics {
    pub fn record(&mut self, label: Label) {
        self.total += 1;
        match label {
            Label::Ok => self.ok += 1,
            Label::NotOk => self.not_ok += 1,
        }
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "total {} (OK {}, NOT_OK {})", self.total, self.ok, self.not_ok)
    }
}
