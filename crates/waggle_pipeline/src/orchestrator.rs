//! Pipeline orchestrator: runs the stages for one video in strict order,
//! reusing on-disk artifacts where possible.
//!
//! Stage order is Detection → Overlay → Tracking → Render. Detections and
//! tracks are cached by artifact presence (plus the global `recalc`
//! override); the overlay and the rendered video are recomputed whenever
//! requested. A collaborator error propagates immediately — artifacts
//! persisted by earlier stages stay on disk and act as cache on retry.

use crate::artifacts::{artifact_paths, read_table, write_table, ArtifactPaths};
use crate::error::{PipelineError, Result, StageKind};
use crate::overlay;
use crate::params::{model_paths, PipelineParams};
use crate::stages::{
    DetectionParams, MarkerDetector, MarkerTracker, MediaProbe, RenderParams, TrackingParams,
    VideoRenderer,
};
use crate::tables::{
    detections_schema, empty_detections, empty_tracks, filter_tagged, overwrite_detection_type,
    tracks_schema, DETECTION_TYPE_TAGGED,
};
use crate::timestamps::video_start_timestamp;
use arrow::array::RecordBatch;
use std::path::PathBuf;
use tracing::{debug, info};

/// One unit of pipeline work. Ephemeral — nothing here is persisted.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub video_path: PathBuf,
    pub output_dir: PathBuf,
    pub params: PipelineParams,
}

/// The external routines the orchestrator drives.
pub struct Collaborators<'a> {
    pub detector: &'a dyn MarkerDetector,
    pub tracker: &'a dyn MarkerTracker,
    pub renderer: &'a dyn VideoRenderer,
    pub probe: &'a dyn MediaProbe,
}

/// What one request produced (or reused).
#[derive(Debug)]
pub struct PipelineOutcome {
    pub artifacts: ArtifactPaths,
    pub detections: RecordBatch,
    pub detections_cached: bool,
    pub tracks: Option<RecordBatch>,
    pub tracks_cached: bool,
    pub rendered: bool,
}

/// Run the pipeline for one video.
pub fn run_pipeline(
    request: &PipelineRequest,
    collaborators: &Collaborators<'_>,
) -> Result<PipelineOutcome> {
    let params = &request.params;
    let video = request.video_path.as_path();
    let paths = artifact_paths(video, &request.output_dir, params);

    info!("Running pipeline on {}", video.display());
    std::fs::create_dir_all(&request.output_dir).map_err(|source| PipelineError::Io {
        path: request.output_dir.clone(),
        source,
    })?;

    // 1) Load or compute detections
    let (detections, detections_cached) = if paths.detections.is_file() && !params.recalc {
        info!(
            "Loading existing detections from {}",
            paths.detections.display()
        );
        (
            read_table(&paths.detections, params.save_filetype, detections_schema())?,
            true,
        )
    } else {
        let table = detect(video, params, collaborators)?;
        write_table(&table, &paths.detections, params.save_filetype)?;
        (table, false)
    };

    // 2) Diagnostic overlay (never cached)
    if params.save_png {
        let frame = collaborators
            .probe
            .first_frame(video)
            .map_err(|e| PipelineError::stage(StageKind::Probe, e))?;
        overlay::write_overlay(&frame, &detections, &paths.overlay)?;
    }

    // 3) Load or compute tracks
    let (tracks, tracks_cached) = if params.use_trajectories {
        if paths.tracks.is_file() && !params.recalc {
            info!("Loading existing tracks from {}", paths.tracks.display());
            (
                Some(read_table(&paths.tracks, params.save_filetype, tracks_schema())?),
                true,
            )
        } else {
            let table = track(&detections, params, collaborators)?;
            write_table(&table, &paths.tracks, params.save_filetype)?;
            (Some(table), false)
        }
    } else {
        (None, false)
    };

    // 4) Rendered analysis video (no cache check; same inputs overwrite the
    //    same output path)
    let mut rendered = false;
    if params.create_video {
        let start = video_start_timestamp(video, params.timestamp_format)?;

        // An empty table is never threaded into the renderer, even when the
        // corresponding flag is on.
        let tracks_input = tracks.as_ref().filter(|batch| batch.num_rows() > 0);
        let detections_input =
            (params.show_untagged && detections.num_rows() > 0).then_some(&detections);

        info!("Rendering analysis video to {}", paths.rendered_video.display());
        collaborators
            .renderer
            .render(
                video,
                &paths.rendered_video,
                start,
                tracks_input,
                detections_input,
                &RenderParams::from_pipeline(params),
            )
            .map_err(|e| PipelineError::stage(StageKind::Render, e))?;
        rendered = true;
    }

    Ok(PipelineOutcome {
        artifacts: paths,
        detections,
        detections_cached,
        tracks,
        tracks_cached,
        rendered,
    })
}

/// Invoke the detection routine, selecting the timestamp source by sidecar
/// presence, and normalize a missing result to an empty table.
fn detect(
    video: &std::path::Path,
    params: &PipelineParams,
    collaborators: &Collaborators<'_>,
) -> Result<RecordBatch> {
    let detection_params = DetectionParams::from_pipeline(params);
    let sidecar = video.with_extension("txt");

    let result = if sidecar.is_file() {
        debug!("Detecting with sidecar timestamps {}", sidecar.display());
        collaborators
            .detector
            .detect_with_sidecar(video, &detection_params)
    } else {
        let fps = collaborators
            .probe
            .fps(video)
            .map_err(|e| PipelineError::stage(StageKind::Probe, e))?;
        debug!("Detecting with fps-derived timestamps (fps={fps:?})");
        collaborators
            .detector
            .detect_with_fps(video, fps, &detection_params)
    };

    let table = result
        .map_err(|e| PipelineError::stage(StageKind::Detection, e))?
        .unwrap_or_else(empty_detections);
    Ok(table)
}

/// Invoke the tracking routine over tagged detections only; normalize a
/// missing result and force the detection-type column.
fn track(
    detections: &RecordBatch,
    params: &PipelineParams,
    collaborators: &Collaborators<'_>,
) -> Result<RecordBatch> {
    let tagged = filter_tagged(detections)?;

    let (detection_model, tracklet_model) = model_paths()?;
    let tracking_params = TrackingParams {
        cm_per_pixel: params.cm_per_pixel,
        detection_model,
        tracklet_model,
    };

    info!("Computing tracks over {} tagged detections", tagged.num_rows());
    let table = collaborators
        .tracker
        .track(&tagged, &tracking_params)
        .map_err(|e| PipelineError::stage(StageKind::Tracking, e))?
        .unwrap_or_else(empty_tracks);

    // The external tracker may not preserve the column.
    overwrite_detection_type(&table, DETECTION_TYPE_TAGGED)
}
