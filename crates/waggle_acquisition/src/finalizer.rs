//! Segment finalizer: sweeps completed recording segments out of the staging
//! directory into the canonical output tree.
//!
//! The recorder writes each segment as a video file plus a sidecar text file
//! whose lines are `<camera-id>_<timestamp>` per captured frame. A sweep
//! renames eligible pairs to `<camera-id>_<first-time>--<last-time>` under
//! `out_dir/<camera>/`. Renames, not copies: per file the move is atomic on
//! the same filesystem.

use crate::error::{AcquisitionError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Video half of a segment pair.
const VIDEO_EXT: &str = "mp4";
/// Sidecar half of a segment pair.
const SIDECAR_EXT: &str = "txt";

/// Safety factor on the per-segment duration: a sidecar untouched for longer
/// than `segment_seconds * RECENCY_MARGIN` is not a candidate for this sweep.
/// The margin covers the writer's flush/close latency on the current segment;
/// anything older is assumed already processed or abandoned and must not be
/// moved twice.
const RECENCY_MARGIN: f64 = 1.5;

/// One pair successfully moved out of staging.
#[derive(Debug, Clone)]
pub struct FinalizedSegment {
    /// Canonical base name, `<camera-id>_<first-time>--<last-time>`.
    pub canonical_base: String,
    pub video: PathBuf,
    pub sidecar: PathBuf,
}

/// Per-pair failure; never aborts the rest of the sweep.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("sidecar line has no '<camera>_<timestamp>' separator: {line:?}")]
    MalformedTimestamp { line: String },

    #[error("failed to read sidecar: {0}")]
    SidecarRead(#[source] std::io::Error),

    #[error("failed to move {} -> {}: {source}", .from.display(), .to.display())]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of one sweep. Zero eligible pairs is a successful no-op.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub finalized: Vec<FinalizedSegment>,
    /// Sidecars outside the recency window (left untouched).
    pub skipped_stale: usize,
    /// Pairs missing their video half or with an empty sidecar.
    pub skipped_incomplete: usize,
    /// Per-pair errors, keyed by the staging sidecar path.
    pub errors: Vec<(PathBuf, SegmentError)>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Sweep `tmp_dir/<camera>/` for complete, recently written segment pairs
/// and rename them into `out_dir/<camera>/`.
pub fn sweep(
    tmp_dir: &Path,
    out_dir: &Path,
    camera: &str,
    frames_per_file: u32,
    frames_per_second: u32,
) -> Result<SweepReport> {
    let staging = tmp_dir.join(camera);
    let destination = out_dir.join(camera);

    let threshold =
        Duration::from_secs_f64(f64::from(frames_per_file) / f64::from(frames_per_second) * RECENCY_MARGIN);
    let cutoff = SystemTime::now()
        .checked_sub(threshold)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut report = SweepReport::default();

    let entries = match fs::read_dir(&staging) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!("Staging directory {} does not exist; nothing to sweep", staging.display());
            return Ok(report);
        }
        Err(source) => {
            return Err(AcquisitionError::Sweep {
                path: staging,
                source,
            })
        }
    };

    let mut sidecars: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(SIDECAR_EXT))
        .collect();
    sidecars.sort();

    if sidecars.is_empty() {
        debug!("No sidecars in {}", staging.display());
        return Ok(report);
    }

    fs::create_dir_all(&destination).map_err(|source| AcquisitionError::Sweep {
        path: destination.clone(),
        source,
    })?;

    for sidecar_path in sidecars {
        match finalize_pair(&sidecar_path, &destination, cutoff, &mut report) {
            Ok(()) => {}
            Err(err) => {
                error!("{}: {}", sidecar_path.display(), err);
                report.errors.push((sidecar_path, err));
            }
        }
    }

    info!(
        "Sweep of {}: {} finalized, {} stale, {} incomplete, {} errors",
        staging.display(),
        report.finalized.len(),
        report.skipped_stale,
        report.skipped_incomplete,
        report.errors.len()
    );
    Ok(report)
}

/// Process a single sidecar; skips are recorded directly on the report,
/// per-pair failures are returned to the caller for collection.
fn finalize_pair(
    sidecar_path: &Path,
    destination: &Path,
    cutoff: SystemTime,
    report: &mut SweepReport,
) -> std::result::Result<(), SegmentError> {
    let mtime = fs::metadata(sidecar_path)
        .and_then(|meta| meta.modified())
        .map_err(SegmentError::SidecarRead)?;
    if mtime < cutoff {
        // Older untouched pairs were handled by an earlier sweep (or were
        // abandoned); re-moving them would duplicate output entries.
        report.skipped_stale += 1;
        return Ok(());
    }

    let video_path = sidecar_path.with_extension(VIDEO_EXT);
    if !video_path.exists() {
        debug!(
            "Sidecar {} has no matching video; segment still incomplete",
            sidecar_path.display()
        );
        report.skipped_incomplete += 1;
        return Ok(());
    }

    let text = fs::read_to_string(sidecar_path).map_err(SegmentError::SidecarRead)?;
    let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());
    let first = match lines.next() {
        Some(line) => line,
        None => {
            warn!("Sidecar {} is empty; skipping", sidecar_path.display());
            report.skipped_incomplete += 1;
            return Ok(());
        }
    };
    let last = lines.last().unwrap_or(first);

    let canonical_base = canonical_base_name(first, last)?;

    let sidecar_dest = destination.join(format!("{canonical_base}.{SIDECAR_EXT}"));
    let video_dest = destination.join(format!("{canonical_base}.{VIDEO_EXT}"));

    rename_into(sidecar_path, &sidecar_dest)?;
    rename_into(&video_path, &video_dest)?;

    info!(
        "Finalized segment {} -> {}",
        sidecar_path.display(),
        sidecar_dest.display()
    );
    report.finalized.push(FinalizedSegment {
        canonical_base,
        video: video_dest,
        sidecar: sidecar_dest,
    });
    Ok(())
}

/// Canonical name for the interval spanned by the first and last sidecar
/// lines: `<camera-id>_<first-time>--<last-time>`. The camera prefix appears
/// once; the second token is the bare time part.
///
/// Lines are assumed chronological; first and last suffice to name the
/// interval.
fn canonical_base_name(first: &str, last: &str) -> std::result::Result<String, SegmentError> {
    let (camera, first_time) =
        first
            .split_once('_')
            .ok_or_else(|| SegmentError::MalformedTimestamp {
                line: first.to_string(),
            })?;
    let (_, last_time) = last
        .split_once('_')
        .ok_or_else(|| SegmentError::MalformedTimestamp {
            line: last.to_string(),
        })?;

    Ok(format!("{camera}_{first_time}--{last_time}"))
}

fn rename_into(from: &Path, to: &Path) -> std::result::Result<(), SegmentError> {
    fs::rename(from, to).map_err(|source| SegmentError::Move {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })
}
