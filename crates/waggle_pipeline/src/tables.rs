//! Arrow schemas and helpers for the detections and tracks tables.
//!
//! Both tables are schema-stable: a stage that produces no rows still yields
//! a zero-row batch with the full schema, so downstream stages handle empty
//! input uniformly. Timestamps are posix seconds (f64) in both tables, which
//! keeps the Parquet and CSV renditions of an artifact identical.

use crate::error::{PipelineError, Result};
use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, RecordBatch, StringArray};
use arrow::compute::filter_record_batch;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use std::sync::Arc;

/// Detection-type tag for markers with a readable tag.
pub const DETECTION_TYPE_TAGGED: &str = "tagged";
/// Detection-type tag for detected but untagged markers.
pub const DETECTION_TYPE_UNTAGGED: &str = "untagged";

const DETECTION_TYPE_COLUMN: &str = "detection_type";

/// Schema of the detections artifact: one row per detected marker instance.
pub fn detections_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("saliency", DataType::Float64, true),
        Field::new("marker_id", DataType::Int64, true),
        Field::new("x", DataType::Float64, true),
        Field::new("y", DataType::Float64, true),
        Field::new("cam_id", DataType::Int64, true),
        Field::new("orientation", DataType::Float64, true),
        Field::new("timestamp", DataType::Float64, true),
        Field::new("frame_index", DataType::Int64, true),
        Field::new("frame_id", DataType::Int64, true),
        Field::new("detection_index", DataType::Int64, true),
        Field::new(DETECTION_TYPE_COLUMN, DataType::Utf8, true),
        Field::new("confidence", DataType::Float64, true),
    ]))
}

/// Schema of the tracks artifact: one row per tracked detection.
pub fn tracks_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("marker_id", DataType::Int64, true),
        Field::new("marker_id_confidence", DataType::Float64, true),
        Field::new("track_id", DataType::Int64, true),
        Field::new("x_pixels", DataType::Float64, true),
        Field::new("y_pixels", DataType::Float64, true),
        Field::new("orientation_pixels", DataType::Float64, true),
        Field::new("x_world", DataType::Float64, true),
        Field::new("y_world", DataType::Float64, true),
        Field::new("orientation_world", DataType::Float64, true),
        Field::new("timestamp", DataType::Float64, true),
        Field::new("frame_id", DataType::Int64, true),
        Field::new(DETECTION_TYPE_COLUMN, DataType::Utf8, true),
        Field::new("detection_index", DataType::Int64, true),
        Field::new("detection_confidence", DataType::Float64, true),
    ]))
}

/// Zero-row detections batch with the full schema.
pub fn empty_detections() -> RecordBatch {
    RecordBatch::new_empty(detections_schema())
}

/// Zero-row tracks batch with the full schema.
pub fn empty_tracks() -> RecordBatch {
    RecordBatch::new_empty(tracks_schema())
}

fn detection_type_column(batch: &RecordBatch) -> Result<(usize, &StringArray)> {
    let index = batch
        .schema()
        .index_of(DETECTION_TYPE_COLUMN)
        .map_err(|_| PipelineError::MissingColumn(DETECTION_TYPE_COLUMN))?;
    let column = batch
        .column(index)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or(PipelineError::ColumnType(DETECTION_TYPE_COLUMN))?;
    Ok((index, column))
}

/// Restrict a detections batch to tagged-marker rows.
pub fn filter_tagged(batch: &RecordBatch) -> Result<RecordBatch> {
    let (_, column) = detection_type_column(batch)?;
    let mask: BooleanArray = column
        .iter()
        .map(|value| Some(value == Some(DETECTION_TYPE_TAGGED)))
        .collect();
    filter_record_batch(batch, &mask)
        .map_err(|e| PipelineError::table("<in-memory>", anyhow::Error::new(e)))
}

/// Force every row's detection type to `value`. The external tracker does
/// not reliably preserve the column, so the tracking stage re-sets it.
pub fn overwrite_detection_type(batch: &RecordBatch, value: &str) -> Result<RecordBatch> {
    let (index, _) = detection_type_column(batch)?;

    let constant = StringArray::from(vec![value; batch.num_rows()]);
    let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
    columns[index] = Arc::new(constant);

    RecordBatch::try_new(batch.schema(), columns)
        .map_err(|e| PipelineError::table("<in-memory>", anyhow::Error::new(e)))
}

/// Read a Float64 column by name (overlay rendering).
pub fn f64_column<'a>(batch: &'a RecordBatch, name: &'static str) -> Result<&'a Float64Array> {
    let index = batch
        .schema()
        .index_of(name)
        .map_err(|_| PipelineError::MissingColumn(name))?;
    batch
        .column(index)
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or(PipelineError::ColumnType(name))
}


#[cfg(test)]
mod tests {
    use super::*;
    use test_support::detections_batch;

    #[test]
    fn empty_tables_carry_the_full_schema() {
        let detections = empty_detections();
        assert_eq!(detections.num_rows(), 0);
        assert_eq!(detections.num_columns(), 12);

        let tracks = empty_tracks();
        assert_eq!(tracks.num_rows(), 0);
        assert_eq!(tracks.num_columns(), 14);
        assert_eq!(tracks.schema(), tracks_schema());
    }

    #[test]
    fn filter_tagged_keeps_only_tagged_rows() {
        let batch = detections_batch(&[
            (1.0, 2.0, 0.0, DETECTION_TYPE_TAGGED),
            (3.0, 4.0, 0.5, DETECTION_TYPE_UNTAGGED),
            (5.0, 6.0, 1.0, DETECTION_TYPE_TAGGED),
        ]);

        let tagged = filter_tagged(&batch).unwrap();
        assert_eq!(tagged.num_rows(), 2);

        let xs = f64_column(&tagged, "x").unwrap();
        assert_eq!(xs.value(0), 1.0);
        assert_eq!(xs.value(1), 5.0);
    }

    #[test]
    fn filter_tagged_on_empty_batch_is_empty() {
        let tagged = filter_tagged(&empty_detections()).unwrap();
        assert_eq!(tagged.num_rows(), 0);
        assert_eq!(tagged.schema(), detections_schema());
    }

    #[test]
    fn overwrite_detection_type_sets_every_row() {
        let batch = detections_batch(&[
            (1.0, 2.0, 0.0, DETECTION_TYPE_UNTAGGED),
            (3.0, 4.0, 0.5, DETECTION_TYPE_UNTAGGED),
        ]);

        let forced = overwrite_detection_type(&batch, DETECTION_TYPE_TAGGED).unwrap();
        let (_, column) = detection_type_column(&forced).unwrap();
        assert!(column.iter().all(|v| v == Some(DETECTION_TYPE_TAGGED)));
    }
}
