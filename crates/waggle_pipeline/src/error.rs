//! Error types for the analysis pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage, for error attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Detection,
    Tracking,
    Overlay,
    Render,
    Probe,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detection => "detection",
            Self::Tracking => "tracking",
            Self::Overlay => "overlay",
            Self::Render => "render",
            Self::Probe => "probe",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// An external routine failed; aborts the request, artifacts from
    /// earlier stages stay on disk.
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: StageKind,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to read/write table {}: {source}", .path.display())]
    Table {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot resolve start timestamp from {input:?}: {reason}")]
    Timestamp { input: String, reason: String },

    #[error("Model directory not set (export {0})")]
    ModelDirUnset(&'static str),

    #[error("Table is missing column {0:?}")]
    MissingColumn(&'static str),

    #[error("Column {0:?} has an unexpected type")]
    ColumnType(&'static str),
}

impl PipelineError {
    pub fn stage(stage: StageKind, source: anyhow::Error) -> Self {
        Self::Stage { stage, source }
    }

    pub(crate) fn table(path: impl Into<PathBuf>, source: impl Into<anyhow::Error>) -> Self {
        Self::Table {
            path: path.into(),
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
