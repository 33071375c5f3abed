//! Atlas/Config Gate (C9, spec §4.9).
//!
//! Grounded in the precondition-check shape of the Stage Runner's own
//! input-presence check (`stage::runner::run` step 1): this is the same
//! check, run one layer earlier, before a subject is even admitted to a
//! stage that would otherwise spawn and immediately fail.

use std::path::{Path, PathBuf};

/// The outcome of gating one subject's referenced atlas/config paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateResult {
    /// Every referenced path exists; the stage may be admitted.
    Admitted,
    /// At least one referenced path is missing; the stage should be
    /// marked `SKIPPED_PRECONDITION` rather than attempted (spec §4.9).
    Missing(PathBuf),
}

/// Verify every atlas/config path a stage consumes exists on disk.
/// Returns the first missing path, if any, for precise diagnostics.
pub fn check(referenced_paths: &[impl AsRef<Path>]) -> GateResult {
    for path in referenced_paths {
        let path = path.as_ref();
        if !path.exists() {
            return GateResult::Missing(path.to_path_buf());
        }
    }
    GateResult::Admitted
}
