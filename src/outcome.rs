//! Run-level aggregation for the Orchestrator Entry (C8, spec §4.8/§6.1):
//! "On completion, emit: count processed, count succeeded, list of failed
//! subject IDs, path to each subject's log file." Exit code per §6.1.

use std::path::PathBuf;

use crate::job::{AggregateVerdict, SubjectOutcome};
use crate::subject::SubjectRef;

/// A failed subject's ID and the log file a human should open next.
#[derive(Debug, Clone)]
pub struct FailedSubject {
    pub subject: SubjectRef,
    pub log_path: PathBuf,
}

/// The whole run's final tally, independent of how the console renders it.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedSubject>,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[SubjectOutcome]) -> Self {
        let processed = outcomes.len();
        let succeeded = outcomes
            .iter()
            .filter(|o| o.verdict == AggregateVerdict::Success)
            .count();
        let failed = outcomes
            .iter()
            .filter(|o| o.verdict == AggregateVerdict::Failed)
            .map(|o| FailedSubject {
                subject: o.subject.clone(),
                log_path: o.log_path.clone(),
            })
            .collect();

        Self {
            processed,
            succeeded,
            failed,
        }
    }

    /// `0` if every subject's aggregate outcome is `SUCCESS`, `1` otherwise
    /// (spec §6.1).
    pub fn exit_code(&self) -> i32 {
        if self.failed.is_empty() {
            0
        } else {
            1
        }
    }

    /// Human-readable console summary, printed once at the end of a run.
    pub fn render(&self) -> String {
        let mut out = format!(
            "processed {} subject(s), {} succeeded, {} failed",
            self.processed,
            self.succeeded,
            self.failed.len()
        );
        for failure in &self.failed {
            out.push_str(&format!(
                "\n  FAILED {} — log: {}",
                failure.subject,
                failure.log_path.display()
            ));
        }
        out
    }
}
