//! Data-driven marker tables for the completion classifier (spec §4.4,
//! §9 Design Notes: "keep the pattern-matching classifier explicit and
//! data-driven... so new stages plug in without editing the runner").

use regex::Regex;

use super::types::StageName;

/// Markers that apply to every stage regardless of name (spec §4.4 steps
/// 6b/6c).
pub struct SharedMarkers {
    pub fatal_system: Vec<&'static str>,
    pub missing_interpreter: Vec<Regex>,
}

/// Per-stage success/failure markers (spec §4.4 steps 6a/6d). Stored as
/// plain string/regex data so a new stage is "a new table row", not a
/// runner code change.
pub struct StageMarkerTable {
    pub success: Vec<&'static str>,
    pub failure: Vec<Regex>,
}

pub fn shared_markers() -> SharedMarkers {
    SharedMarkers {
        fatal_system: vec![
            "Illegal instruction",
            "Segmentation fault",
            "Bus error",
            "Killed",
            "Aborted",
        ],
        missing_interpreter: vec![
            Regex::new(r"bad interpreter").unwrap(),
            Regex::new(r"No such file or directory.*interpreter").unwrap(),
        ],
    }
}

/// The marker table for one stage. RECON is the only stage spec.md names
/// explicit markers for (§4.4); CHARM/TISSUE/DICOM fall back to the
/// shared markers plus exit code, per the Open Question resolution in
/// DESIGN.md ("applied only where a stage's marker table defines a
/// `success` entry").
pub fn table_for(stage: StageName) -> StageMarkerTable {
    match stage {
        StageName::Recon => StageMarkerTable {
            success: vec!["finished without error"],
            failure: vec![
                Regex::new(r"recon-all.*exited with ERRORS").unwrap(),
                Regex::new(r"FAILED").unwrap(),
                Regex::new(r"Fatal error in recon-all").unwrap(),
                Regex::new(r"ERROR: must specify a subject").unwrap(),
            ],
        },
        StageName::Dicom | StageName::Charm | StageName::Tissue => StageMarkerTable {
            success: Vec::new(),
            failure: Vec::new(),
        },
    }
}
