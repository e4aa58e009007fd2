//! Recorder process supervision and segment finalization.
//!
//! This crate owns the acquisition side of Waggle: a single-instance
//! supervisor for the external recorder process (mutual exclusion via a pid
//! lockfile), and the finalizer that sweeps completed segment pairs out of
//! the staging directory into their canonical, interval-named locations.

pub mod error;
pub mod finalizer;
pub mod lockfile;
pub mod process;
pub mod supervisor;

pub use error::{AcquisitionError, Result};
pub use finalizer::{sweep, FinalizedSegment, SegmentError, SweepReport};
pub use lockfile::{LockFile, LockStatus};
pub use supervisor::{PollStatus, StopOutcome, Supervisor, SupervisorState};
