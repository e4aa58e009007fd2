//! Pid lockfile: the single point of mutual exclusion for "is a recorder
//! running".
//!
//! The file holds one decimal pid. Acquisition is an atomic exclusive create
//! (`create_new`), not a check-then-write sequence, so two controllers racing
//! to start a recorder cannot both succeed. A lockfile whose pid no longer
//! corresponds to a running process is stale and is removed on read.

use crate::error::{AcquisitionError, Result};
use crate::process::process_alive;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// State of the lockfile on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    /// No lockfile present.
    Absent,
    /// Lockfile present and the pid is a running process.
    Live(u32),
    /// Lockfile present but the pid is dead (or the content is not a pid).
    Stale,
}

/// Handle to the lockfile path. Does not itself hold the lock; see
/// [`LockFile::acquire`].
#[derive(Debug, Clone)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> AcquisitionError {
        AcquisitionError::Lock {
            path: self.path.clone(),
            source,
        }
    }

    /// Inspect the lockfile without mutating it.
    pub fn status(&self) -> Result<LockStatus> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(LockStatus::Absent),
            Err(err) => return Err(self.io_err(err)),
        };

        match text.trim().parse::<u32>() {
            Ok(pid) if process_alive(pid) => Ok(LockStatus::Live(pid)),
            Ok(pid) => {
                debug!("Lockfile pid {} is not running", pid);
                Ok(LockStatus::Stale)
            }
            Err(_) => {
                warn!(
                    "Lockfile {} does not contain a pid: {:?}",
                    self.path.display(),
                    text.trim()
                );
                Ok(LockStatus::Stale)
            }
        }
    }

    /// Return the live pid, removing the lockfile when it is stale.
    pub fn read_live(&self) -> Result<Option<u32>> {
        match self.status()? {
            LockStatus::Absent => Ok(None),
            LockStatus::Live(pid) => Ok(Some(pid)),
            LockStatus::Stale => {
                warn!("Removing stale lockfile {}", self.path.display());
                self.remove()?;
                Ok(None)
            }
        }
    }

    /// Reserve the lock by creating the file exclusively.
    ///
    /// The reservation holds no pid yet; [`LockReservation::commit`] writes
    /// it once the recorder has been spawned. Dropping an uncommitted
    /// reservation releases the lock.
    pub fn acquire(&self) -> Result<LockReservation> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;

        debug!("Reserved lockfile {}", self.path.display());
        Ok(LockReservation {
            file: Some(file),
            path: self.path.clone(),
            committed: false,
        })
    }

    /// Remove the lockfile if present.
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.io_err(err)),
        }
    }
}

/// An exclusively created, not-yet-committed lockfile.
#[derive(Debug)]
pub struct LockReservation {
    file: Option<std::fs::File>,
    path: PathBuf,
    committed: bool,
}

impl LockReservation {
    /// Durably record the recorder pid.
    pub fn commit(mut self, pid: u32) -> Result<()> {
        let path = self.path.clone();
        let err = |source| AcquisitionError::Lock {
            path: path.clone(),
            source,
        };

        let mut file = self.file.take().expect("reservation file already taken");
        file.write_all(pid.to_string().as_bytes()).map_err(&err)?;
        file.sync_all().map_err(&err)?;
        self.committed = true;
        debug!("Committed pid {} to lockfile {}", pid, self.path.display());
        Ok(())
    }
}

impl Drop for LockReservation {
    fn drop(&mut self) {
        if !self.committed {
            drop(self.file.take());
            if let Err(err) = fs::remove_file(&self.path) {
                if err.kind() != ErrorKind::NotFound {
                    warn!(
                        "Failed to release uncommitted lockfile {}: {}",
                        self.path.display(),
                        err
                    );
                }
            }
        }
    }
}
