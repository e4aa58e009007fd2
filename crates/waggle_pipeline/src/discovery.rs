//! Video discovery: which source videos exist, and which artifacts each one
//! already has. Drives listings and lets callers skip fully processed
//! videos without invoking the orchestrator.

use crate::artifacts::artifact_paths;
use crate::error::{PipelineError, Result};
use crate::params::PipelineParams;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Source video extensions considered for the pipeline.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "h264"];

/// Rendered outputs carry this marker and are never pipeline inputs.
const RENDERED_MARKER: &str = "-tracked-video";

/// Artifact presence for one video under one parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactStatus {
    pub has_detections: bool,
    pub has_tracks: bool,
    pub has_rendered_video: bool,
}

/// List pipeline-eligible videos in `input_dir`, sorted by name.
pub fn list_videos(input_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(input_dir).map_err(|source| PipelineError::Io {
        path: input_dir.to_path_buf(),
        source,
    })?;

    let mut videos: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            let extension_matches = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext));
            let is_rendered_output = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.contains(RENDERED_MARKER));
            extension_matches && !is_rendered_output
        })
        .collect();
    videos.sort();

    debug!("Found {} videos in {}", videos.len(), input_dir.display());
    Ok(videos)
}

/// Which artifacts already exist for `video` under `results_dir`.
pub fn artifact_status(
    video: &Path,
    results_dir: &Path,
    params: &PipelineParams,
) -> ArtifactStatus {
    let paths = artifact_paths(video, results_dir, params);
    ArtifactStatus {
        has_detections: paths.detections.is_file(),
        has_tracks: paths.tracks.is_file(),
        has_rendered_video: paths.rendered_video.is_file(),
    }
}
