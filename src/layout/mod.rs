//! Path & BIDS Layout Service (C1, spec §4.1).

mod templates;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::OrchestratorError;
use crate::subject::SubjectRef;

pub use templates::{render_root_readme, DerivativeRoot, ALL_DERIVATIVE_ROOTS};

/// The fully materialized BIDS project layout. Immutable and shared after
/// `materialize` completes (spec §3 ownership note).
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    /// Absolute path to the project root.
    pub project_dir: PathBuf,
    /// Basename of `project_dir`; never contains whitespace or path
    /// separators (enforced at construction).
    pub project_name: String,
}

impl ProjectLayout {
    pub fn sourcedata_root(&self) -> PathBuf {
        self.project_dir.join("sourcedata")
    }

    pub fn derivative_root(&self, root: DerivativeRoot) -> PathBuf {
        self.project_dir.join("derivatives").join(root.dir_name())
    }

    pub fn anat_root(&self, subject: &SubjectRef) -> PathBuf {
        self.project_dir.join(subject.bids_name()).join("anat")
    }

    pub fn anat_extra_root(&self, subject: &SubjectRef) -> PathBuf {
        self.anat_root(subject).join("extra")
    }

    pub fn dicom_root(&self, subject: &SubjectRef, scan_type: &str) -> PathBuf {
        self.sourcedata_root()
            .join(subject.bids_name())
            .join(scan_type)
            .join("dicom")
    }

    pub fn freesurfer_root(&self, subject: &SubjectRef) -> PathBuf {
        self.derivative_root(DerivativeRoot::FreeSurfer)
            .join(subject.bids_name())
    }

    pub fn m2m_root(&self, subject: &SubjectRef) -> PathBuf {
        self.derivative_root(DerivativeRoot::SimNibs)
            .join(subject.bids_name())
            .join(format!("m2m_{}", subject.id()))
    }

    pub fn tissue_analysis_root(&self, subject: &SubjectRef) -> PathBuf {
        self.derivative_root(DerivativeRoot::TiToolbox)
            .join("tissue_analysis")
            .join(subject.bids_name())
    }

    pub fn logs_root(&self, subject: &SubjectRef) -> PathBuf {
        self.derivative_root(DerivativeRoot::TiToolbox)
            .join("logs")
            .join(subject.bids_name())
    }

    pub fn reports_root(&self, subject: &SubjectRef) -> PathBuf {
        self.derivative_root(DerivativeRoot::TiToolbox)
            .join("reports")
            .join(subject.bids_name())
    }
}

/// Create (idempotently) the full BIDS tree for `project_dir` and every
/// subject in `subjects`, seed `dataset_description.json`/`README` files
/// that don't yet exist, and return the resulting `ProjectLayout`.
///
/// Never overwrites a file it has already written (spec §4.1 invariant;
/// tested as the idempotent-layout property in spec §8).
pub fn materialize(
    project_dir: &Path,
    subjects: &[SubjectRef],
) -> Result<ProjectLayout, OrchestratorError> {
    if !project_dir.is_absolute() {
        return Err(OrchestratorError::Layout {
            project_dir: project_dir.to_path_buf(),
            reason: "project_dir must be an absolute path".to_string(),
        });
    }

    fs::create_dir_all(project_dir).map_err(|e| OrchestratorError::Layout {
        project_dir: project_dir.to_path_buf(),
        reason: format!("failed to create project directory: {e}"),
    })?;

    let metadata = fs::metadata(project_dir).map_err(|e| OrchestratorError::Layout {
        project_dir: project_dir.to_path_buf(),
        reason: format!("cannot stat project directory: {e}"),
    })?;
    if !metadata.is_dir() {
        return Err(OrchestratorError::Layout {
            project_dir: project_dir.to_path_buf(),
            reason: "project_dir is not a directory".to_string(),
        });
    }

    let project_name = project_dir
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();

    if project_name.is_empty() {
        return Err(OrchestratorError::Layout {
            project_dir: project_dir.to_path_buf(),
            reason: "project directory basename is empty".to_string(),
        });
    }
    if project_name.chars().any(|c| c.is_whitespace()) {
        return Err(OrchestratorError::Layout {
            project_dir: project_dir.to_path_buf(),
            reason: "project name must not contain whitespace".to_string(),
        });
    }

    let layout = ProjectLayout {
        project_dir: project_dir.to_path_buf(),
        project_name,
    };

    create_dir_all_checked(project_dir, &layout.sourcedata_root())?;
    create_dir_all_checked(project_dir, &project_dir.join("derivatives"))?;

    for root in ALL_DERIVATIVE_ROOTS {
        create_dir_all_checked(project_dir, &layout.derivative_root(root))?;
        seed_derivative_description(project_dir, &layout, root)?;
    }

    for subject in subjects {
        create_subject_workspace(project_dir, &layout, subject)?;
    }

    seed_root_files(project_dir, &layout)?;

    Ok(layout)
}

/// Create the fixed set of directories for one subject's workspace
/// (spec §3 `SubjectWorkspace`). Must run before the subject is admitted
/// to scheduling.
fn create_subject_workspace(
    project_dir: &Path,
    layout: &ProjectLayout,
    subject: &SubjectRef,
) -> Result<(), OrchestratorError> {
    create_dir_all_checked(project_dir, &layout.dicom_root(subject, "T1w"))?;
    create_dir_all_checked(project_dir, &layout.dicom_root(subject, "T2w"))?;
    create_dir_all_checked(project_dir, &layout.anat_root(subject))?;
    create_dir_all_checked(project_dir, &layout.freesurfer_root(subject))?;
    create_dir_all_checked(project_dir, &layout.m2m_root(subject).parent().unwrap().to_path_buf())?;
    create_dir_all_checked(project_dir, &layout.tissue_analysis_root(subject))?;
    create_dir_all_checked(project_dir, &layout.logs_root(subject))?;
    Ok(())
}

fn create_dir_all_checked(project_dir: &Path, path: &Path) -> Result<(), OrchestratorError> {
    fs::create_dir_all(path).map_err(|e| OrchestratorError::Layout {
        project_dir: project_dir.to_path_buf(),
        reason: format!("failed to create directory {}: {e}", path.display()),
    })
}

fn seed_derivative_description(
    project_dir: &Path,
    layout: &ProjectLayout,
    root: DerivativeRoot,
) -> Result<(), OrchestratorError> {
    let path = layout.derivative_root(root).join("dataset_description.json");
    if path.exists() {
        return Ok(());
    }
    let rendered = templates::render_derivative_description(root, &layout.project_name)
        .map_err(|e| reattach_project_dir(e, project_dir))?;
    fs::write(&path, rendered).map_err(|e| OrchestratorError::Layout {
        project_dir: project_dir.to_path_buf(),
        reason: format!("failed to write {}: {e}", path.display()),
    })
}

fn seed_root_files(
    project_dir: &Path,
    layout: &ProjectLayout,
) -> Result<(), OrchestratorError> {
    let description_path = project_dir.join("dataset_description.json");
    if !description_path.exists() {
        let rendered = templates::render_root_description(&layout.project_name)
            .map_err(|e| reattach_project_dir(e, project_dir))?;
        fs::write(&description_path, rendered).map_err(|e| OrchestratorError::Layout {
            project_dir: project_dir.to_path_buf(),
            reason: format!("failed to write {}: {e}", description_path.display()),
        })?;
    }

    let readme_path = project_dir.join("README");
    if !readme_path.exists() {
        fs::write(&readme_path, templates::render_root_readme()).map_err(|e| {
            OrchestratorError::Layout {
                project_dir: project_dir.to_path_buf(),
                reason: format!("failed to write {}: {e}", readme_path.display()),
            }
        })?;
    }

    Ok(())
}

fn reattach_project_dir(err: OrchestratorError, project_dir: &Path) -> OrchestratorError {
    match err {
        OrchestratorError::Layout { reason, .. } => OrchestratorError::Layout {
            project_dir: project_dir.to_path_buf(),
            reason,
        },
        other => other,
    }
}
