//! Collaborator traits for the external analysis routines.
//!
//! Detection, tracking and rendering are opaque algorithms supplied by the
//! caller; the orchestrator only routes tables and paths between them. Every
//! routine may legitimately produce nothing (`None`) — the orchestrator
//! normalizes that to an empty, schema-stable table.

use crate::params::PipelineParams;
use arrow::array::RecordBatch;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Parameters handed to the detection routine.
#[derive(Debug, Clone)]
pub struct DetectionParams {
    pub tag_pixel_diameter: f64,
    pub use_clahe: bool,
    pub cam_id: i64,
}

impl DetectionParams {
    pub fn from_pipeline(params: &PipelineParams) -> Self {
        Self {
            tag_pixel_diameter: params.tag_pixel_diameter,
            use_clahe: params.use_clahe,
            cam_id: 0,
        }
    }
}

/// Parameters handed to the tracking routine.
#[derive(Debug, Clone)]
pub struct TrackingParams {
    pub cm_per_pixel: f64,
    pub detection_model: PathBuf,
    pub tracklet_model: PathBuf,
}

/// Display parameters handed to the render routine.
#[derive(Debug, Clone)]
pub struct RenderParams {
    pub scale_factor: f64,
    pub track_history: u32,
    pub r_tagged: u32,
    pub r_untagged: u32,
}

impl RenderParams {
    pub fn from_pipeline(params: &PipelineParams) -> Self {
        Self {
            scale_factor: params.scale_factor,
            track_history: params.track_history,
            r_tagged: params.r_tagged,
            r_untagged: params.r_untagged,
        }
    }
}

/// Marker detection over one video. The sidecar variant reads per-frame
/// capture timestamps from the `.txt` companion; the fps variant derives
/// frame times from a (possibly unknown) frame rate.
pub trait MarkerDetector {
    fn detect_with_sidecar(
        &self,
        video: &Path,
        params: &DetectionParams,
    ) -> anyhow::Result<Option<RecordBatch>>;

    fn detect_with_fps(
        &self,
        video: &Path,
        fps: Option<f64>,
        params: &DetectionParams,
    ) -> anyhow::Result<Option<RecordBatch>>;
}

/// Track construction over tagged detections.
pub trait MarkerTracker {
    fn track(
        &self,
        tagged_detections: &RecordBatch,
        params: &TrackingParams,
    ) -> anyhow::Result<Option<RecordBatch>>;
}

/// Rendering of the analysis video. `tracks`/`detections` are only ever
/// non-empty tables; the orchestrator withholds empty ones.
pub trait VideoRenderer {
    #[allow(clippy::too_many_arguments)]
    fn render(
        &self,
        video: &Path,
        output: &Path,
        start: DateTime<Utc>,
        tracks: Option<&RecordBatch>,
        detections: Option<&RecordBatch>,
        params: &RenderParams,
    ) -> anyhow::Result<()>;
}

/// Media introspection: frame rate and first frame.
pub trait MediaProbe {
    /// Frame rate, when the container exposes one.
    fn fps(&self, video: &Path) -> anyhow::Result<Option<f64>>;

    /// Decoded first frame, for the diagnostic overlay.
    fn first_frame(&self, video: &Path) -> anyhow::Result<image::RgbImage>;
}
