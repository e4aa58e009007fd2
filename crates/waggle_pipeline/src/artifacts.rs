//! Artifact paths and tabular artifact IO.
//!
//! Artifact names derive deterministically from the source video's base
//! name, a stage suffix, and the configured table format. Tables are written
//! to a temp file and renamed into place, so a half-written artifact can
//! never be mistaken for valid cache.

use crate::error::{PipelineError, Result};
use crate::params::PipelineParams;
use arrow::array::RecordBatch;
use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Serialization format for tabular artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFormat {
    Parquet,
    Csv,
}

impl TableFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Parquet => "parquet",
            Self::Csv => "csv",
        }
    }
}

impl FromStr for TableFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "parquet" => Ok(Self::Parquet),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unknown table format: {other:?}")),
        }
    }
}

/// The four artifact locations for one video under one parameter set.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub detections: PathBuf,
    pub tracks: PathBuf,
    pub overlay: PathBuf,
    pub rendered_video: PathBuf,
}

/// Derive artifact paths from the video base name and parameters.
pub fn artifact_paths(
    video_path: &Path,
    output_dir: &Path,
    params: &PipelineParams,
) -> ArtifactPaths {
    let base = video_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = params.save_filetype.extension();

    ArtifactPaths {
        detections: output_dir.join(format!("{base}{}.{ext}", params.detections_suffix)),
        tracks: output_dir.join(format!("{base}{}.{ext}", params.tracks_suffix)),
        overlay: output_dir.join(format!("{base}-detections.png")),
        rendered_video: output_dir.join(format!("{base}-tracked-video.mp4")),
    }
}

/// Write a table artifact atomically (temp file + rename).
pub fn write_table(batch: &RecordBatch, path: &Path, format: TableFormat) -> Result<()> {
    let table_err = |source: anyhow::Error| PipelineError::table(path, source);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| table_err(e.into()))?;
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{file_name}.tmp"));

    let file = File::create(&temp_path).map_err(|e| table_err(e.into()))?;
    match format {
        TableFormat::Parquet => {
            let props = WriterProperties::builder()
                .set_compression(Compression::SNAPPY)
                .build();
            let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
                .map_err(|e| table_err(e.into()))?;
            writer.write(batch).map_err(|e| table_err(e.into()))?;
            writer.close().map_err(|e| table_err(e.into()))?;
        }
        TableFormat::Csv => {
            let mut writer = arrow::csv::WriterBuilder::new()
                .with_header(true)
                .build(file);
            writer.write(batch).map_err(|e| table_err(e.into()))?;
        }
    }

    fs::rename(&temp_path, path).map_err(|e| table_err(e.into()))?;
    debug!("Wrote {} rows to {}", batch.num_rows(), path.display());
    Ok(())
}

/// Read a table artifact back as a single batch. A file holding zero rows
/// yields an empty batch with `schema`.
pub fn read_table(path: &Path, format: TableFormat, schema: SchemaRef) -> Result<RecordBatch> {
    let table_err = |source: anyhow::Error| PipelineError::table(path, source);

    let file = File::open(path).map_err(|e| table_err(e.into()))?;
    let batches: Vec<RecordBatch> = match format {
        TableFormat::Parquet => {
            let reader = ParquetRecordBatchReaderBuilder::try_new(file)
                .map_err(|e| table_err(e.into()))?
                .build()
                .map_err(|e| table_err(e.into()))?;
            reader
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| table_err(e.into()))?
        }
        TableFormat::Csv => {
            let reader = arrow::csv::ReaderBuilder::new(schema.clone())
                .with_header(true)
                .build(file)
                .map_err(|e| table_err(e.into()))?;
            reader
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| table_err(e.into()))?
        }
    };

    if batches.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }
    concat_batches(&batches[0].schema(), &batches).map_err(|e| table_err(e.into()))
}
