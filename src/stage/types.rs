use std::path::PathBuf;
use std::time::Duration;

use crate::monitor::ResourceSnapshot;

/// The four externally executed transformations named in spec §3/§6.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageName {
    Dicom,
    Charm,
    Recon,
    Tissue,
}

impl StageName {
    pub fn label(self) -> &'static str {
        match self {
            StageName::Dicom => "DICOM",
            StageName::Charm => "CHARM",
            StageName::Recon => "RECON",
            StageName::Tissue => "TISSUE",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A unit of externally executed work, synthesized by the job/scheduler
/// layer before it reaches the Stage Runner (spec §3 `Stage`).
#[derive(Debug, Clone)]
pub struct StageSpec {
    pub name: StageName,
    /// Must all exist and be readable before the child is spawned.
    pub inputs: Vec<PathBuf>,
    /// Directory this stage owns; consulted by the overwrite policy and
    /// deleted wholesale on failure/abort (spec §4.4 steps 2 and 8).
    pub output_root: PathBuf,
    pub executable: String,
    pub args: Vec<String>,
    /// Directory the child is spawned in. Several stage executables (CHARM
    /// in particular) write their output tree relative to the working
    /// directory rather than taking an explicit destination argument, so
    /// the job layer sets this to `output_root`'s parent where that
    /// matters. `None` inherits the orchestrator's own working directory.
    pub working_dir: Option<PathBuf>,
}

/// One of the five terminal states of spec §3 `StageOutcome`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    Failed,
    SkippedExists,
    SkippedPrecondition,
    Aborted,
}

impl Verdict {
    /// Whether this verdict counts as success for `SubjectOutcome`
    /// aggregation (spec §3: "SUCCESS iff every required stage is SUCCESS
    /// or SKIPPED_EXISTS").
    pub fn counts_as_success(self) -> bool {
        matches!(self, Verdict::Success | Verdict::SkippedExists)
    }

    /// Whether a stage that depends on this one may still be started
    /// (spec §8 dependency-respect invariant: not started if the upstream
    /// stage is FAILED/ABORTED).
    pub fn permits_dependents(self) -> bool {
        !matches!(self, Verdict::Failed | Verdict::Aborted)
    }
}

/// The full record of one stage's run, per spec §3.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub stage: StageName,
    pub verdict: Verdict,
    pub duration: Duration,
    pub log_path: Option<PathBuf>,
    pub post_snapshot: Option<ResourceSnapshot>,
    /// The single detail that best explains the verdict (missing input
    /// path, matched marker, exit code) — surfaced in the final summary.
    pub detail: String,
}

impl StageOutcome {
    pub fn skipped_precondition(stage: StageName, missing: &std::path::Path) -> Self {
        Self {
            stage,
            verdict: Verdict::SkippedPrecondition,
            duration: Duration::ZERO,
            log_path: None,
            post_snapshot: None,
            detail: format!("missing required input {}", missing.display()),
        }
    }

    pub fn skipped_exists(stage: StageName) -> Self {
        Self {
            stage,
            verdict: Verdict::SkippedExists,
            duration: Duration::ZERO,
            log_path: None,
            post_snapshot: None,
            detail: "output already exists".to_string(),
        }
    }

    pub fn not_started(stage: StageName, upstream: StageName) -> Self {
        Self {
            stage,
            verdict: Verdict::Failed,
            duration: Duration::ZERO,
            log_path: None,
            post_snapshot: None,
            detail: format!("not started: upstream stage {upstream} did not succeed"),
        }
    }
}
