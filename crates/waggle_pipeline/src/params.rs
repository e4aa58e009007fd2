//! Pipeline parameter set.
//!
//! One value of [`PipelineParams`] governs a whole request: which stages run,
//! where artifacts go, and what the external routines are told. Changing
//! parameters does NOT invalidate existing artifacts — presence on disk is
//! the only cache key — so callers that change parameters must set `recalc`.

use crate::artifacts::TableFormat;
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How a video's start timestamp is encoded in its filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimestampFormat {
    /// Canonical interval names as produced by the segment finalizer
    /// (`<camera>_<start>--<end>`), or a plain ISO timestamp stem.
    Structured,
    /// Device-local naming: a trailing `_`-separated naive local time token,
    /// interpreted in the device timezone.
    DeviceLocal,
}

impl TimestampFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::DeviceLocal => "device-local",
        }
    }
}

impl FromStr for TimestampFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "structured" => Ok(Self::Structured),
            "device-local" => Ok(Self::DeviceLocal),
            other => Err(format!("unknown timestamp format: {other:?}")),
        }
    }
}

/// Parameters for one pipeline request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineParams {
    /// Expected tag diameter in pixels (detection geometry).
    pub tag_pixel_diameter: f64,
    /// Pixel-to-physical scale for tracking (cm per pixel).
    pub cm_per_pixel: f64,
    /// Global override: recompute every cached stage.
    pub recalc: bool,
    pub timestamp_format: TimestampFormat,
    /// Run the tracking stage.
    pub use_trajectories: bool,
    /// Serialization format for the tabular artifacts.
    pub save_filetype: TableFormat,
    /// Run the render stage.
    pub create_video: bool,
    /// Output scale for the rendered video.
    pub scale_factor: f64,
    /// Trailing track positions drawn per frame.
    pub track_history: u32,
    /// Marker radius (pixels) for tagged detections in the rendered video.
    pub r_tagged: u32,
    /// Marker radius (pixels) for untagged detections.
    pub r_untagged: u32,
    /// Write the diagnostic detection-overlay PNG.
    pub save_png: bool,
    /// Thread untagged detections into the rendered video.
    pub show_untagged: bool,
    /// Contrast normalization during detection.
    pub use_clahe: bool,
    /// Suffix of the detections artifact (before the format extension).
    pub detections_suffix: String,
    /// Suffix of the tracks artifact.
    pub tracks_suffix: String,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            tag_pixel_diameter: 45.0,
            cm_per_pixel: 200.0 / 5312.0,
            recalc: false,
            timestamp_format: TimestampFormat::Structured,
            use_trajectories: true,
            save_filetype: TableFormat::Parquet,
            create_video: false,
            scale_factor: 0.25,
            track_history: 0,
            r_tagged: 20,
            r_untagged: 5,
            save_png: false,
            show_untagged: false,
            use_clahe: true,
            detections_suffix: "-detections".to_string(),
            tracks_suffix: "-tracks".to_string(),
        }
    }
}

impl PipelineParams {
    /// Defaults for a given timestamp format. Device-local recordings name
    /// their detections artifact with no suffix.
    pub fn for_timestamp_format(format: TimestampFormat) -> Self {
        let mut params = Self {
            timestamp_format: format,
            ..Self::default()
        };
        if format == TimestampFormat::DeviceLocal {
            params.detections_suffix = String::new();
        }
        params
    }
}

/// Environment variable naming the pretrained-model directory.
pub const MODEL_DIR_ENV: &str = "WAGGLE_MODEL_DIR";

pub(crate) const DETECTION_MODEL_FILE: &str = "detection_model_4.json";
pub(crate) const TRACKLET_MODEL_FILE: &str = "tracklet_model_8.json";

/// Resolve the two pretrained model files from `WAGGLE_MODEL_DIR`.
pub fn model_paths() -> Result<(std::path::PathBuf, std::path::PathBuf), PipelineError> {
    let dir = std::env::var_os(MODEL_DIR_ENV)
        .map(std::path::PathBuf::from)
        .ok_or(PipelineError::ModelDirUnset(MODEL_DIR_ENV))?;
    Ok((
        dir.join(DETECTION_MODEL_FILE),
        dir.join(TRACKLET_MODEL_FILE),
    ))
}
