//! Stage Runner (C4) and External Stage Contract (C10), spec §4.4/§4.10.

mod markers;
mod runner;
mod types;

pub use runner::{resolve_executable, run};
pub use types::{StageName, StageOutcome, StageSpec, Verdict};
