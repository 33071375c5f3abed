//! The `Configuration` value threaded through C6/C7/C4, replacing the
//! ad-hoc global state/environment-variable communication flagged in
//! spec §9 Design Notes.

use std::path::PathBuf;

use crate::overwrite::OverwritePolicy;
use crate::subject::SubjectRef;

/// Which stages this run's subjects should attempt (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineFlags {
    pub convert_dicom: bool,
    pub create_m2m: bool,
    pub run_recon: bool,
    pub run_tissue: bool,
}

/// Sequential vs. Parallel, per spec §4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Sequential,
    Parallel { cores_hint: Option<usize> },
}

/// Everything C6/C7/C4 need, resolved once at startup by C8 and shared
/// read-only for the rest of the run.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub project_dir: PathBuf,
    pub subjects: Vec<SubjectRef>,
    pub pipeline: PipelineFlags,
    pub overwrite: OverwritePolicy,
    pub mode: ExecutionMode,
    /// Atlas/config paths CHARM is gated on (C9), the same for every
    /// subject in the run. Resolved once from `CHARM_ATLAS_DIR`; empty
    /// when unset, which admits CHARM unconditionally.
    pub atlas_paths: Vec<PathBuf>,
}

impl Configuration {
    /// Number of CPU cores to advertise to stage children in Sequential
    /// mode, or to use as the Parallel-mode concurrency cap when no
    /// `--cores` override is supplied (spec §4.7).
    pub fn detected_cores() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}
