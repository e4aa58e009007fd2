//! Error types for supervision and finalization.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Recorder is already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("No recorder is running")]
    NotRunning,

    #[error("Recorder (pid {pid}) did not exit within the {}s grace period", .grace.as_secs())]
    StopTimeout {
        pid: u32,
        grace: std::time::Duration,
    },

    #[error("Failed to signal recorder (pid {pid}): {source}")]
    Signal {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn recorder {}: {source}", .command.display())]
    Spawn {
        command: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Lockfile error at {}: {source}", .path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to sweep staging directory {}: {source}", .path.display())]
    Sweep {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] waggle_config::ConfigError),
}

pub type Result<T> = std::result::Result<T, AcquisitionError>;
