//! End-to-end orchestrator tests with counting collaborator stand-ins.

use arrow::array::{ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::{tempdir, TempDir};
use waggle_pipeline::tables::{
    detections_schema, tracks_schema, DETECTION_TYPE_TAGGED, DETECTION_TYPE_UNTAGGED,
};
use waggle_pipeline::{
    run_pipeline, Collaborators, DetectionParams, MarkerDetector, MarkerTracker, MediaProbe,
    PipelineError, PipelineParams, PipelineRequest, RenderParams, StageKind, TrackingParams,
    VideoRenderer,
};

const CANONICAL_VIDEO: &str = "cam-0_2025-01-22T13:36:01.562Z--2025-01-22T13:36:11.395Z.mp4";

fn detections_rows(types: &[&str]) -> RecordBatch {
    let n = types.len();
    let f64s = |v: f64| -> ArrayRef { std::sync::Arc::new(Float64Array::from(vec![v; n])) };
    let i64s = |v: i64| -> ArrayRef { std::sync::Arc::new(Int64Array::from(vec![v; n])) };

    RecordBatch::try_new(
        detections_schema(),
        vec![
            f64s(0.9),
            i64s(7),
            f64s(10.0),
            f64s(20.0),
            i64s(0),
            f64s(0.5),
            f64s(1_737_552_961.5),
            i64s(0),
            i64s(100),
            i64s(0),
            std::sync::Arc::new(StringArray::from(types.to_vec())),
            f64s(0.99),
        ],
    )
    .unwrap()
}

fn tracks_rows(n: usize, detection_type: &str) -> RecordBatch {
    let f64s = |v: f64| -> ArrayRef { std::sync::Arc::new(Float64Array::from(vec![v; n])) };
    let i64s = |v: i64| -> ArrayRef { std::sync::Arc::new(Int64Array::from(vec![v; n])) };

    RecordBatch::try_new(
        tracks_schema(),
        vec![
            i64s(7),
            f64s(0.8),
            i64s(1),
            f64s(10.0),
            f64s(20.0),
            f64s(0.5),
            f64s(0.4),
            f64s(0.8),
            f64s(0.5),
            f64s(1_737_552_961.5),
            i64s(100),
            std::sync::Arc::new(StringArray::from(vec![detection_type; n])),
            i64s(0),
            f64s(0.99),
        ],
    )
    .unwrap()
}

#[derive(Default)]
struct CountingDetector {
    sidecar_calls: AtomicUsize,
    fps_calls: AtomicUsize,
    seen_fps: Mutex<Option<Option<f64>>>,
    result: Option<RecordBatch>,
    fail: bool,
}

impl CountingDetector {
    fn returning(result: Option<RecordBatch>) -> Self {
        Self {
            result,
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.sidecar_calls.load(Ordering::SeqCst) + self.fps_calls.load(Ordering::SeqCst)
    }
}

impl MarkerDetector for CountingDetector {
    fn detect_with_sidecar(
        &self,
        _video: &Path,
        _params: &DetectionParams,
    ) -> anyhow::Result<Option<RecordBatch>> {
        self.sidecar_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("detector exploded");
        }
        Ok(self.result.clone())
    }

    fn detect_with_fps(
        &self,
        _video: &Path,
        fps: Option<f64>,
        _params: &DetectionParams,
    ) -> anyhow::Result<Option<RecordBatch>> {
        self.fps_calls.fetch_add(1, Ordering::SeqCst);
        *self.seen_fps.lock().unwrap() = Some(fps);
        if self.fail {
            anyhow::bail!("detector exploded");
        }
        Ok(self.result.clone())
    }
}

#[derive(Default)]
struct CountingTracker {
    calls: AtomicUsize,
    seen_rows: Mutex<Option<usize>>,
    result: Option<RecordBatch>,
    fail: bool,
}

impl CountingTracker {
    fn returning(result: Option<RecordBatch>) -> Self {
        Self {
            result,
            ..Self::default()
        }
    }
}

impl MarkerTracker for CountingTracker {
    fn track(
        &self,
        tagged_detections: &RecordBatch,
        _params: &TrackingParams,
    ) -> anyhow::Result<Option<RecordBatch>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.seen_rows.lock().unwrap() = Some(tagged_detections.num_rows());
        if self.fail {
            anyhow::bail!("tracker exploded");
        }
        Ok(self.result.clone())
    }
}

/// Records what the orchestrator threads in; (rows or None) per table.
#[derive(Default)]
struct RecordingRenderer {
    calls: AtomicUsize,
    seen: Mutex<Option<(Option<usize>, Option<usize>, DateTime<Utc>)>>,
}

impl VideoRenderer for RecordingRenderer {
    fn render(
        &self,
        _video: &Path,
        output: &Path,
        start: DateTime<Utc>,
        tracks: Option<&RecordBatch>,
        detections: Option<&RecordBatch>,
        _params: &RenderParams,
    ) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.seen.lock().unwrap() = Some((
            tracks.map(RecordBatch::num_rows),
            detections.map(RecordBatch::num_rows),
            start,
        ));
        std::fs::write(output, b"rendered")?;
        Ok(())
    }
}

struct StaticProbe {
    fps: Option<f64>,
}

impl MediaProbe for StaticProbe {
    fn fps(&self, _video: &Path) -> anyhow::Result<Option<f64>> {
        Ok(self.fps)
    }

    fn first_frame(&self, _video: &Path) -> anyhow::Result<image::RgbImage> {
        Ok(image::RgbImage::new(8, 8))
    }
}

struct Fixture {
    _dir: TempDir,
    video: PathBuf,
    output_dir: PathBuf,
}

fn fixture(video_name: &str, with_sidecar: bool) -> Fixture {
    std::env::set_var("WAGGLE_MODEL_DIR", "/opt/waggle/models");

    let dir = tempdir().unwrap();
    let video = dir.path().join(video_name);
    std::fs::write(&video, b"video-bytes").unwrap();
    if with_sidecar {
        std::fs::write(video.with_extension("txt"), "cam-0_2025-01-22T13:36:01.562Z").unwrap();
    }
    let output_dir = dir.path().join("results");
    Fixture {
        _dir: dir,
        video,
        output_dir,
    }
}

fn request(fixture: &Fixture, params: PipelineParams) -> PipelineRequest {
    PipelineRequest {
        video_path: fixture.video.clone(),
        output_dir: fixture.output_dir.clone(),
        params,
    }
}

#[test]
fn detection_is_cached_by_artifact_presence() {
    let f = fixture(CANONICAL_VIDEO, true);
    let detector = CountingDetector::returning(Some(detections_rows(&[DETECTION_TYPE_TAGGED])));
    let tracker = CountingTracker::default();
    let renderer = RecordingRenderer::default();
    let probe = StaticProbe { fps: Some(6.0) };
    let collaborators = Collaborators {
        detector: &detector,
        tracker: &tracker,
        renderer: &renderer,
        probe: &probe,
    };

    let mut params = PipelineParams::default();
    params.use_trajectories = false;

    let first = run_pipeline(&request(&f, params.clone()), &collaborators).unwrap();
    assert!(!first.detections_cached);
    assert_eq!(detector.calls(), 1);

    let second = run_pipeline(&request(&f, params), &collaborators).unwrap();
    assert!(second.detections_cached);
    assert_eq!(detector.calls(), 1, "second run must load from disk");
    assert_eq!(second.detections, first.detections);
}

#[test]
fn recalc_always_reinvokes_the_detector() {
    let f = fixture(CANONICAL_VIDEO, true);
    let detector = CountingDetector::returning(Some(detections_rows(&[DETECTION_TYPE_TAGGED])));
    let tracker = CountingTracker::default();
    let renderer = RecordingRenderer::default();
    let probe = StaticProbe { fps: None };
    let collaborators = Collaborators {
        detector: &detector,
        tracker: &tracker,
        renderer: &renderer,
        probe: &probe,
    };

    let mut params = PipelineParams::default();
    params.use_trajectories = false;
    params.recalc = true;

    run_pipeline(&request(&f, params.clone()), &collaborators).unwrap();
    run_pipeline(&request(&f, params), &collaborators).unwrap();
    assert_eq!(detector.calls(), 2);
}

#[test]
fn sidecar_presence_selects_the_detector_variant() {
    let with = fixture(CANONICAL_VIDEO, true);
    let detector = CountingDetector::returning(None);
    let tracker = CountingTracker::default();
    let renderer = RecordingRenderer::default();
    let probe = StaticProbe { fps: Some(12.5) };
    let collaborators = Collaborators {
        detector: &detector,
        tracker: &tracker,
        renderer: &renderer,
        probe: &probe,
    };

    let mut params = PipelineParams::default();
    params.use_trajectories = false;
    run_pipeline(&request(&with, params.clone()), &collaborators).unwrap();
    assert_eq!(detector.sidecar_calls.load(Ordering::SeqCst), 1);
    assert_eq!(detector.fps_calls.load(Ordering::SeqCst), 0);

    let without = fixture(CANONICAL_VIDEO, false);
    let detector = CountingDetector::returning(None);
    let collaborators = Collaborators {
        detector: &detector,
        tracker: &tracker,
        renderer: &renderer,
        probe: &probe,
    };
    run_pipeline(&request(&without, params), &collaborators).unwrap();
    assert_eq!(detector.sidecar_calls.load(Ordering::SeqCst), 0);
    assert_eq!(detector.fps_calls.load(Ordering::SeqCst), 1);
    assert_eq!(*detector.seen_fps.lock().unwrap(), Some(Some(12.5)));
}

#[test]
fn empty_detections_flow_into_empty_tracks_with_schema() {
    let f = fixture(CANONICAL_VIDEO, true);
    let detector = CountingDetector::returning(None);
    let tracker = CountingTracker::returning(None);
    let renderer = RecordingRenderer::default();
    let probe = StaticProbe { fps: None };
    let collaborators = Collaborators {
        detector: &detector,
        tracker: &tracker,
        renderer: &renderer,
        probe: &probe,
    };

    let outcome = run_pipeline(&request(&f, PipelineParams::default()), &collaborators).unwrap();

    assert_eq!(outcome.detections.num_rows(), 0);
    assert_eq!(outcome.detections.schema(), detections_schema());

    let tracks = outcome.tracks.expect("tracking was enabled");
    assert_eq!(tracks.num_rows(), 0);
    assert_eq!(tracks.schema(), tracks_schema());
    // the tracker saw the (empty) tagged subset without erroring
    assert_eq!(*tracker.seen_rows.lock().unwrap(), Some(0));
}

#[test]
fn tracker_receives_only_tagged_rows() {
    let f = fixture(CANONICAL_VIDEO, true);
    let detector = CountingDetector::returning(Some(detections_rows(&[
        DETECTION_TYPE_TAGGED,
        DETECTION_TYPE_UNTAGGED,
        DETECTION_TYPE_TAGGED,
    ])));
    let tracker = CountingTracker::returning(Some(tracks_rows(2, DETECTION_TYPE_UNTAGGED)));
    let renderer = RecordingRenderer::default();
    let probe = StaticProbe { fps: None };
    let collaborators = Collaborators {
        detector: &detector,
        tracker: &tracker,
        renderer: &renderer,
        probe: &probe,
    };

    let outcome = run_pipeline(&request(&f, PipelineParams::default()), &collaborators).unwrap();
    assert_eq!(*tracker.seen_rows.lock().unwrap(), Some(2));

    // the detection-type column is force-set after tracking
    let tracks = outcome.tracks.unwrap();
    let column = tracks
        .column(tracks.schema().index_of("detection_type").unwrap())
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap()
        .clone();
    assert!(column.iter().all(|v| v == Some(DETECTION_TYPE_TAGGED)));
}

#[test]
fn renderer_never_receives_empty_tables() {
    let f = fixture(CANONICAL_VIDEO, true);
    let detector = CountingDetector::returning(None);
    let tracker = CountingTracker::returning(None);
    let renderer = RecordingRenderer::default();
    let probe = StaticProbe { fps: None };
    let collaborators = Collaborators {
        detector: &detector,
        tracker: &tracker,
        renderer: &renderer,
        probe: &probe,
    };

    let mut params = PipelineParams::default();
    params.create_video = true;
    params.show_untagged = true;

    let outcome = run_pipeline(&request(&f, params), &collaborators).unwrap();
    assert!(outcome.rendered);

    let (tracks_rows_seen, detections_rows_seen, _) = renderer.seen.lock().unwrap().unwrap();
    assert_eq!(tracks_rows_seen, None, "empty tracks must be withheld");
    assert_eq!(detections_rows_seen, None, "empty detections must be withheld");
}

#[test]
fn renderer_receives_populated_tables_and_the_start_instant() {
    let f = fixture(CANONICAL_VIDEO, true);
    let detector = CountingDetector::returning(Some(detections_rows(&[
        DETECTION_TYPE_TAGGED,
        DETECTION_TYPE_UNTAGGED,
    ])));
    let tracker = CountingTracker::returning(Some(tracks_rows(1, DETECTION_TYPE_TAGGED)));
    let renderer = RecordingRenderer::default();
    let probe = StaticProbe { fps: None };
    let collaborators = Collaborators {
        detector: &detector,
        tracker: &tracker,
        renderer: &renderer,
        probe: &probe,
    };

    let mut params = PipelineParams::default();
    params.create_video = true;
    params.show_untagged = true;

    let outcome = run_pipeline(&request(&f, params), &collaborators).unwrap();
    assert!(outcome.artifacts.rendered_video.exists());

    let (tracks_rows_seen, detections_rows_seen, start) = renderer.seen.lock().unwrap().unwrap();
    assert_eq!(tracks_rows_seen, Some(1));
    assert_eq!(detections_rows_seen, Some(2));
    assert_eq!(
        start,
        "2025-01-22T13:36:01.562Z".parse::<DateTime<Utc>>().unwrap()
    );
}

#[test]
fn stage_failure_propagates_and_keeps_earlier_artifacts() {
    let f = fixture(CANONICAL_VIDEO, true);
    let detector = CountingDetector::returning(Some(detections_rows(&[DETECTION_TYPE_TAGGED])));
    let tracker = CountingTracker {
        fail: true,
        ..CountingTracker::default()
    };
    let renderer = RecordingRenderer::default();
    let probe = StaticProbe { fps: None };
    let collaborators = Collaborators {
        detector: &detector,
        tracker: &tracker,
        renderer: &renderer,
        probe: &probe,
    };

    let err = run_pipeline(&request(&f, PipelineParams::default()), &collaborators).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Stage {
            stage: StageKind::Tracking,
            ..
        }
    ));

    // detections artifact survived the abort and is reused on retry
    let retry_tracker = CountingTracker::returning(Some(tracks_rows(1, DETECTION_TYPE_TAGGED)));
    let collaborators = Collaborators {
        detector: &detector,
        tracker: &retry_tracker,
        renderer: &renderer,
        probe: &probe,
    };
    let outcome = run_pipeline(&request(&f, PipelineParams::default()), &collaborators).unwrap();
    assert!(outcome.detections_cached);
    assert_eq!(detector.calls(), 1);
    assert_eq!(retry_tracker.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn overlay_is_written_when_requested_and_never_cached() {
    let f = fixture(CANONICAL_VIDEO, true);
    let detector = CountingDetector::returning(Some(detections_rows(&[DETECTION_TYPE_TAGGED])));
    let tracker = CountingTracker::default();
    let renderer = RecordingRenderer::default();
    let probe = StaticProbe { fps: None };
    let collaborators = Collaborators {
        detector: &detector,
        tracker: &tracker,
        renderer: &renderer,
        probe: &probe,
    };

    let mut params = PipelineParams::default();
    params.use_trajectories = false;
    params.save_png = true;

    let outcome = run_pipeline(&request(&f, params.clone()), &collaborators).unwrap();
    assert!(outcome.artifacts.overlay.exists());

    // stamp the overlay, rerun, and confirm it was rewritten
    std::fs::write(&outcome.artifacts.overlay, b"stale").unwrap();
    run_pipeline(&request(&f, params), &collaborators).unwrap();
    let bytes = std::fs::read(&outcome.artifacts.overlay).unwrap();
    assert_ne!(bytes, b"stale");
}
