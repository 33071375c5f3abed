//! §6.3 DICOM canonicalization: after the external DICOM→NIfTI tool emits
//! `.nii.gz`/`.json` pairs alongside the DICOM source, route each pair to
//! its canonical `anat/` slot or divert it to `anat/extra/`.
//!
//! **[SUPPLEMENT]**: this module has no direct teacher analog; it is
//! grounded in the pattern-based file-routing discipline the spec itself
//! prescribes (presence/rename only, never content parsing).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;

use crate::layout::ProjectLayout;
use crate::logger::SubjectLogger;
use crate::overwrite::{Decision, OverwritePolicy, PromptChannel};
use crate::subject::SubjectRef;

/// The two scan types canonicalization ever recognizes (spec §3 "Canonical
/// anatomical").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanType {
    T1w,
    T2w,
}

impl ScanType {
    fn label(self) -> &'static str {
        match self {
            ScanType::T1w => "T1w",
            ScanType::T2w => "T2w",
        }
    }
}

/// One dcm2niix-style output pair.
#[derive(Debug, Clone)]
struct Pair {
    nii: PathBuf,
    json: PathBuf,
}

/// Canonicalize every `.nii.gz`/`.json` pair found under `subject`'s
/// `sourcedata/.../{T1w,T2w}/dicom/` trees (spec §6.3).
///
/// Each pair's directory of origin is only a *hint*: the actual scan type
/// is resolved per pair via `classify` (directory hint first, else the
/// JSON `SeriesDescription` field), since the external DICOM tool is free
/// to emit a mis-filed series into either type's source directory.
pub fn canonicalize(
    layout: &ProjectLayout,
    subject: &SubjectRef,
    overwrite: &OverwritePolicy,
    is_tty: bool,
    prompt: &dyn PromptChannel,
    logger: &SubjectLogger,
) -> Result<()> {
    let anat_root = layout.anat_root(subject);
    let extra_root = layout.anat_extra_root(subject);
    std::fs::create_dir_all(&anat_root)
        .with_context(|| format!("failed to create {}", anat_root.display()))?;

    let mut resolved: Vec<(ScanType, Pair)> = Vec::new();
    for hint in [ScanType::T1w, ScanType::T2w] {
        let search_root = layout.dicom_root(subject, hint.label());
        for pair in discover_pairs(&search_root, logger)? {
            let scan_type = classify(&pair.nii, &pair.json, hint, logger);
            resolved.push((scan_type, pair));
        }
    }

    for scan_type in [ScanType::T1w, ScanType::T2w] {
        let pairs: Vec<Pair> = resolved
            .iter()
            .filter(|(t, _)| *t == scan_type)
            .map(|(_, p)| p.clone())
            .collect();
        if pairs.is_empty() {
            continue;
        }

        let canonical_nii = anat_root.join(format!("sub-{}_{}.nii.gz", subject.id(), scan_type.label()));
        let canonical_json = anat_root.join(format!("sub-{}_{}.json", subject.id(), scan_type.label()));

        let mut pairs = pairs.into_iter();
        let first = pairs.next().expect("checked non-empty above");

        if canonical_nii.exists() {
            let decision = overwrite.decide(&canonical_nii, is_tty, prompt)?;
            // The companion .json never got its own overwrite decision;
            // it always tracks the .nii.gz it belongs to.
            if canonical_json.exists() && decision == Decision::Proceed {
                let _ = std::fs::remove_file(&canonical_json);
            }
            match decision {
                Decision::Proceed => {
                    move_pair(&first, &canonical_nii, &canonical_json, logger)?;
                }
                Decision::Skip => {
                    divert(&first, &extra_root, logger)?;
                }
            }
        } else {
            move_pair(&first, &canonical_nii, &canonical_json, logger)?;
        }

        // Spec §6.3 step 4: "Additional series beyond the first of a type
        // are always diverted to anat/extra/. No automatic run-NN
        // disambiguation is ever created."
        for extra_pair in pairs {
            divert(&extra_pair, &extra_root, logger)?;
        }
    }

    Ok(())
}

/// Collect every `.nii.gz`/`.json` pair directly under `search_root`
/// (the subject's `T1w`/`T2w` DICOM source directory). The caller still
/// classifies each pair individually (spec §6.3 step 1): this only
/// gathers candidates, it does not assume the directory determines type.
fn discover_pairs(search_root: &Path, logger: &SubjectLogger) -> Result<Vec<Pair>> {
    let mut found = Vec::new();
    if !search_root.is_dir() {
        return Ok(found);
    }

    let mut nii_files: Vec<PathBuf> = std::fs::read_dir(search_root)
        .with_context(|| format!("failed to read {}", search_root.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.to_string_lossy().ends_with(".nii.gz"))
        .collect();
    nii_files.sort();

    for nii in nii_files {
        let json = sibling_json(&nii);
        if !json.exists() {
            logger.warn(&format!(
                "DICOM output {} has no companion .json, skipping",
                nii.display()
            ));
            continue;
        }
        found.push(Pair { nii, json });
    }

    Ok(found)
}

fn sibling_json(nii: &Path) -> PathBuf {
    let name = nii.to_string_lossy();
    let stem = name.strip_suffix(".nii.gz").unwrap_or(&name);
    PathBuf::from(format!("{stem}.json"))
}

/// Determine scan type: parent directory hint first, else the JSON
/// `SeriesDescription` field matched against `[Tt]1`/`[Tt]2` (spec §6.3
/// step 1).
fn classify(nii: &Path, json: &Path, hint: ScanType, logger: &SubjectLogger) -> ScanType {
    if path_contains_component(nii, "T1w") {
        return ScanType::T1w;
    }
    if path_contains_component(nii, "T2w") {
        return ScanType::T2w;
    }

    if let Ok(text) = std::fs::read_to_string(json) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
            if let Some(series) = value.get("SeriesDescription").and_then(|v| v.as_str()) {
                let t1 = Regex::new(r"[Tt]1").unwrap();
                let t2 = Regex::new(r"[Tt]2").unwrap();
                if t1.is_match(series) {
                    return ScanType::T1w;
                }
                if t2.is_match(series) {
                    return ScanType::T2w;
                }
            }
        }
    }

    logger.warn(&format!(
        "could not determine scan type for {}; defaulting to search-root hint {}",
        nii.display(),
        hint.label()
    ));
    hint
}

fn path_contains_component(path: &Path, component: &str) -> bool {
    path.components()
        .any(|c| c.as_os_str().to_str() == Some(component))
}

fn move_pair(pair: &Pair, nii_dest: &Path, json_dest: &Path, logger: &SubjectLogger) -> Result<()> {
    std::fs::rename(&pair.nii, nii_dest)
        .with_context(|| format!("failed to move {} to {}", pair.nii.display(), nii_dest.display()))?;
    std::fs::rename(&pair.json, json_dest).with_context(|| {
        format!(
            "failed to move {} to {}",
            pair.json.display(),
            json_dest.display()
        )
    })?;
    logger.info(&format!(
        "canonicalized {} -> {}",
        pair.nii.display(),
        nii_dest.display()
    ));
    Ok(())
}

fn divert(pair: &Pair, extra_root: &Path, logger: &SubjectLogger) -> Result<()> {
    std::fs::create_dir_all(extra_root)
        .with_context(|| format!("failed to create {}", extra_root.display()))?;

    let nii_name = pair.nii.file_name().expect("nii path has a filename");
    let json_name = pair.json.file_name().expect("json path has a filename");
    let nii_dest = extra_root.join(nii_name);
    let json_dest = extra_root.join(json_name);

    std::fs::rename(&pair.nii, &nii_dest)
        .with_context(|| format!("failed to divert {} to extra/", pair.nii.display()))?;
    std::fs::rename(&pair.json, &json_dest)
        .with_context(|| format!("failed to divert {} to extra/", pair.json.display()))?;

    logger.info(&format!(
        "diverted {} -> {} (additional series, never auto-numbered)",
        pair.nii.display(),
        nii_dest.display()
    ));
    Ok(())
}
