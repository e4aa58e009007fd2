//! Placeholder analysis engines.
//!
//! The detection, tracking and render algorithms live outside this
//! repository; deployments link a real engine behind the
//! `waggle_pipeline::stages` traits. This binary ships with a null engine so
//! the artifact plumbing (caching, empty-table normalization, sweeps) can be
//! exercised end to end: detection and tracking report "nothing found",
//! operations that cannot be faked fail with a clear message.

use anyhow::bail;
use arrow::array::RecordBatch;
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::warn;
use waggle_pipeline::{
    DetectionParams, MarkerDetector, MarkerTracker, MediaProbe, RenderParams, TrackingParams,
    VideoRenderer,
};

pub struct NullAnalysis;

impl MarkerDetector for NullAnalysis {
    fn detect_with_sidecar(
        &self,
        video: &Path,
        _params: &DetectionParams,
    ) -> anyhow::Result<Option<RecordBatch>> {
        warn!(
            "No detection engine configured; reporting zero detections for {}",
            video.display()
        );
        Ok(None)
    }

    fn detect_with_fps(
        &self,
        video: &Path,
        _fps: Option<f64>,
        _params: &DetectionParams,
    ) -> anyhow::Result<Option<RecordBatch>> {
        warn!(
            "No detection engine configured; reporting zero detections for {}",
            video.display()
        );
        Ok(None)
    }
}

impl MarkerTracker for NullAnalysis {
    fn track(
        &self,
        _tagged_detections: &RecordBatch,
        _params: &TrackingParams,
    ) -> anyhow::Result<Option<RecordBatch>> {
        warn!("No tracking engine configured; reporting zero tracks");
        Ok(None)
    }
}

impl VideoRenderer for NullAnalysis {
    fn render(
        &self,
        _video: &Path,
        _output: &Path,
        _start: DateTime<Utc>,
        _tracks: Option<&RecordBatch>,
        _detections: Option<&RecordBatch>,
        _params: &RenderParams,
    ) -> anyhow::Result<()> {
        bail!("no render engine configured")
    }
}

impl MediaProbe for NullAnalysis {
    fn fps(&self, _video: &Path) -> anyhow::Result<Option<f64>> {
        Ok(None)
    }

    fn first_frame(&self, _video: &Path) -> anyhow::Result<image::RgbImage> {
        bail!("no media decoder configured")
    }
}
