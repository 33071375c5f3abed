//! Error taxonomy for the orchestrator (see spec §7).
//!
//! §7 names seven error classes, but only two of them — `USAGE` and
//! `LAYOUT` — are ever raised as a hard `Result::Err` that aborts before
//! any subject is admitted. The other five (`PRECONDITION`,
//! `EXISTS_CONFLICT`, `EXTERNAL_FAILURE`, `ABORTED`, `INTERNAL`) are
//! per-stage *outcomes*, not failures to construct a run: they are already
//! fully represented by `stage::Verdict` (`SkippedPrecondition`,
//! `SkippedExists`, `Failed`, `Aborted`) and `SubjectJob::record_internal_error`,
//! which carry the same subject/stage/path context `StageOutcome`
//! accumulates per spec §3, and are what `finish()`/`RunSummary` actually
//! match on. A second enum duplicating those same five classes here would
//! just be dead API with no constructor ever calling it, so this type is
//! deliberately scoped to the two classes that really do short-circuit
//! the run with a `Result::Err`.

use std::path::PathBuf;

use thiserror::Error;

/// The two error classes of spec §7 that abort the run before any subject
/// is admitted to scheduling; every other §7 class is a per-stage
/// `Verdict` instead (see module docs above).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Invalid invocation: unknown flag, missing subject, conflicting flags.
    #[error("usage error: {0}")]
    Usage(String),

    /// The BIDS layout could not be created (permissions, missing template).
    #[error("layout error for project {project_dir}: {reason}")]
    Layout { project_dir: PathBuf, reason: String },
}
