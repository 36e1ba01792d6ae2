// SPDX-License-Identifier: GPL-3.0-only

//! Sample file naming
//!
//! `<prefix>_[<category>_]<YYYYMMDD_HHMMSS_mmm>[_<n>].jpg`

use super::Label;
use crate::constants::dataset;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// Lower-case, spaces to underscores, anything outside `[a-z0-9_-]` dropped
///
/// Returns `None` when nothing usable is left.
pub fn sanitize_category(category: &str) -> Option<String> {
    let normalized: String = category
        .trim()
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            'a'..='z' | '0'..='9' | '_' | '-' => Some(c),
            _ => None,
        })
        .collect();
    (!normalized.is_empty()).then_some(normalized)
}

pub fn timestamp(now: &DateTime<Local>) -> String {
    now.format(dataset::TIMESTAMP_FORMAT).to_string()
}

/// File name for a sample; `suffix` 0 means no collision suffix
pub fn sample_file_name(label: Label, category: Option<&str>, stamp: &str, suffix: u32) -> String {
    let mut name = label.prefix().to_string();
    if let (Label::NotOk, Some(category)) = (label, category) {
        name.push('_');
        name.push_str(category);
    }
    name.push('_');
    name.push_str(stamp);
    if suffix > 0 {
        name.push_str(&format!("_{}", suffix));
    }
    name.push('.');
    name.push_str(dataset::SAMPLE_EXTENSION);
    name
}

/// First free path in `dir`, adding `_1`, `_2`, ... on collision
pub fn unique_sample_path(dir: &Path, label: Label, category: Option<&str>, stamp: &str) -> PathBuf {
    let mut suffix = 0;
    loop {
        let path = dir.join(sample_file_name(label, category, stamp, suffix));
        if !path.exists() {
            return path;
        }
        suffix += 1;
    }
}

/// Hidden in-progress path next to `final_path`
pub fn partial_path(final_path: &Path) -> PathBuf {
    let name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    final_path.with_file_name(format!(".{}.{}", name, dataset::PARTIAL_SUFFIX))
}

/// True for finished sample files (not hidden, not partial, `.jpg`)
pub fn is_sample_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    !name.starts_with('.')
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(dataset::SAMPLE_EXTENSION))
}
