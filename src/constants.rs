// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

/// Timing constants
pub mod timing {
    use std::time::Duration;

    /// Acquisition loop tick (~30 Hz)
    pub const TICK_INTERVAL: Duration = Duration::from_millis(33);

    /// Log frame statistics every N frames
    pub const FRAME_LOG_INTERVAL: u64 = 30;

    /// Lower bound for the per-read wait, regardless of frame rate
    pub const MIN_READ_TIMEOUT: Duration = Duration::from_millis(100);

    /// Window used to measure delivered frames per second
    pub const FPS_WINDOW: Duration = Duration::from_secs(1);
}

/// Video format constants
pub mod formats {
    /// Frame rates offered by the settings surface, highest first
    pub const SUPPORTED_FRAMERATES: &[u32] = &[60, 30, 15];

    /// Default target frame rate
    pub const DEFAULT_FPS: u32 = 30;

    /// Number of mmap buffers requested from V4L2
    pub const V4L2_BUFFER_COUNT: u32 = 4;

    /// Pixel formats preferred for USB webcams, in negotiation order
    pub const USB_FOURCC_PREFERENCE: &[&[u8; 4]] = &[b"MJPG", b"YUYV", b"RGB3"];

    /// Pixel formats preferred for depth camera color sensors
    pub const DEPTH_COLOR_FOURCC_PREFERENCE: &[&[u8; 4]] = &[b"YUYV", b"RGB3", b"UYVY"];

    /// FourCC codes that mark a node as a depth stream
    pub const DEPTH_FOURCCS: &[&[u8; 4]] = &[b"Z16 ", b"Y16 ", b"Y10B"];
}

/// Focus control constants
pub mod focus {
    /// Manual focus slider default (middle of 0-255)
    pub const DEFAULT_MANUAL_FOCUS: u8 = 128;

    /// Upper bound of the manual focus scale exposed to callers
    pub const MANUAL_FOCUS_MAX: u8 = 255;
}

/// Depth camera constants
pub mod depth {
    use crate::backends::camera::Resolution;

    /// Frames discarded after opening so auto exposure settles
    pub const WARMUP_FRAMES: usize = 30;

    /// Drivers that only ever expose depth cameras
    pub const DEPTH_DRIVERS: &[&str] = &["kinect"];

    /// Color stream mode used when switching to a depth camera
    pub const DEFAULT_RESOLUTION: Resolution = Resolution::Vga;
    pub const DEFAULT_FPS: u32 = 30;
}

/// Dataset storage constants
pub mod dataset {
    /// Default storage root, relative to the working directory
    pub const DEFAULT_STORAGE_ROOT: &str = "storage/dataset";

    /// Directory for accepted samples
    pub const OK_DIR: &str = "ok";

    /// Directory for rejected samples
    pub const NOT_OK_DIR: &str = "not_ok";

    /// Filename prefix for accepted samples
    pub const OK_PREFIX: &str = "ok";

    /// Filename prefix for rejected samples
    pub const NOT_OK_PREFIX: &str = "notok";

    /// Sample file extension
    pub const SAMPLE_EXTENSION: &str = "jpg";

    /// Suffix of in-progress writes; never picked up by reconcile
    pub const PARTIAL_SUFFIX: &str = "part";

    /// Timestamp embedded in filenames: YYYYMMDD_HHMMSS_mmm
    pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

    /// Maximum gallery entries held in memory
    pub const GALLERY_CAPACITY: usize = 50;

    /// Longest thumbnail edge in pixels
    pub const THUMBNAIL_MAX_EDGE: u32 = 58;

    /// Default JPEG quality (0-100)
    pub const DEFAULT_JPEG_QUALITY: u8 = 92;

    /// Defect categories offered when rejecting a part
    pub const DEFECT_CATEGORIES: &[&str] = &[
        "Surface Defect",
        "Crack",
        "Scratch",
        "Dent",
        "Discoloration",
        "Missing Part",
        "Contamination",
    ];
}

/// Configuration file location
pub mod config {
    /// Directory name under the platform config dir
    pub const APP_DIR: &str = "inspection-station";

    /// Config file name
    pub const FILE_NAME: &str = "config.json";
}
