//! Diagnostic detection overlay: positions and orientation vectors drawn on
//! the video's first frame. Purely diagnostic and cheap, so it is never
//! cached — every request that asks for it gets a fresh render.

use crate::error::{PipelineError, Result, StageKind};
use crate::tables::f64_column;
use arrow::array::{Array, RecordBatch};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use std::path::Path;
use tracing::debug;

const POSITION_COLOR: Rgb<u8> = Rgb([220, 40, 40]);
const ORIENTATION_COLOR: Rgb<u8> = Rgb([240, 220, 40]);
const POSITION_RADIUS: i32 = 6;
/// Length of the orientation vector in pixels.
const ORIENTATION_LENGTH: f64 = 40.0;

/// Draw the detections onto a copy of `frame`. A zero-row table yields the
/// frame unchanged (detection can legitimately find nothing).
pub fn render_detection_overlay(frame: &RgbImage, detections: &RecordBatch) -> Result<RgbImage> {
    let mut canvas = frame.clone();
    if detections.num_rows() == 0 {
        return Ok(canvas);
    }

    let xs = f64_column(detections, "x")?;
    let ys = f64_column(detections, "y")?;
    let orientations = f64_column(detections, "orientation")?;

    for row in 0..detections.num_rows() {
        if xs.is_null(row) || ys.is_null(row) {
            continue;
        }
        let (x, y) = (xs.value(row), ys.value(row));
        draw_filled_circle_mut(
            &mut canvas,
            (x.round() as i32, y.round() as i32),
            POSITION_RADIUS,
            POSITION_COLOR,
        );

        if orientations.is_null(row) {
            continue;
        }
        let angle = orientations.value(row);
        draw_line_segment_mut(
            &mut canvas,
            (x as f32, y as f32),
            (
                (x + ORIENTATION_LENGTH * angle.cos()) as f32,
                (y + ORIENTATION_LENGTH * angle.sin()) as f32,
            ),
            ORIENTATION_COLOR,
        );
    }

    Ok(canvas)
}

/// Render the overlay and write it as a PNG.
pub fn write_overlay(frame: &RgbImage, detections: &RecordBatch, path: &Path) -> Result<()> {
    let canvas = render_detection_overlay(frame, detections)?;
    canvas
        .save(path)
        .map_err(|e| PipelineError::stage(StageKind::Overlay, e.into()))?;
    debug!(
        "Wrote detection overlay ({} detections) to {}",
        detections.num_rows(),
        path.display()
    );
    Ok(())
}
