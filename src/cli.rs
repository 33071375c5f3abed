//! CLI Surface (C12) / Orchestrator Entry invocation parsing (C8, spec
//! §6.1–§6.2), via `clap::Parser` — following the teacher's
//! `cli/types.rs` convention of doc comments becoming `--help` text.
//!
//! Unlike the teacher's multi-command `loom` binary, this invocation has
//! no subcommands: §6.1 describes one flat flag surface.

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::config::{Configuration, ExecutionMode, PipelineFlags};
use crate::error::OrchestratorError;
use crate::overwrite::OverwritePolicy;
use crate::subject::SubjectRef;

#[derive(Parser, Debug)]
#[command(name = "structural")]
#[command(about = "Structural preprocessing orchestrator for the TI toolbox", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subject paths of the shape `<project_root>/sub-<id>` (or bare
    /// `sub-<id>` / `<id>`, resolved relative to the current directory).
    pub subject_paths: Vec<String>,

    /// Comma-separated subject IDs; the project root is then taken from
    /// `PROJECT_DIR_NAME` instead of a positional path.
    #[arg(long, value_delimiter = ',')]
    pub subjects: Vec<String>,

    /// Enable the RECON stage. Spec §6.1 gives this flag with no `--`
    /// prefix (a bare `recon-all` keyword, unlike every other flag here),
    /// so it never reaches clap as a declared arg: `parse`/`parse_from`
    /// below strip it out of the raw arguments before delegating, and set
    /// this field from that instead.
    #[arg(skip)]
    pub recon_all: bool,

    /// Enable RECON only; suppresses DICOM/CHARM/TISSUE regardless of
    /// their own flags.
    #[arg(long)]
    pub recon_only: bool,

    /// Enable the DICOM→NIfTI conversion stage.
    #[arg(long)]
    pub convert_dicom: bool,

    /// Enable the CHARM head-model stage.
    #[arg(long)]
    pub create_m2m: bool,

    /// Enable the tissue-analysis stage.
    #[arg(long)]
    pub run_tissue: bool,

    /// Select Parallel mode (default is Sequential).
    #[arg(long)]
    pub parallel: bool,

    /// Cap Parallel-mode concurrency at N (default: detected core count).
    #[arg(long)]
    pub cores: Option<usize>,
}

impl Cli {
    /// Parse the process's own arguments (spec §6.1), recognizing the bare
    /// `recon-all` keyword before handing the rest to clap.
    pub fn parse() -> Self {
        Self::parse_from(std::env::args())
    }

    /// As `parse`, but from an explicit argument iterator (used by tests
    /// and by `parse` itself). Shadows `clap::Parser::parse_from` for
    /// calls written as `Cli::parse_from(...)`: inherent methods take
    /// precedence over trait methods of the same name, so this is the one
    /// that actually runs; it reaches the trait version internally via
    /// `<Self as clap::Parser>::parse_from`.
    pub fn parse_from<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let args: Vec<std::ffi::OsString> = args.into_iter().map(Into::into).collect();

        let recon_all_keyword = std::ffi::OsString::from("recon-all");
        let mut recon_all = false;
        let mut filtered = Vec::with_capacity(args.len());
        for (index, arg) in args.into_iter().enumerate() {
            // Only a bare positional token counts; argv[0] is the program
            // name and is never eligible.
            if index > 0 && arg == recon_all_keyword {
                recon_all = true;
                continue;
            }
            filtered.push(arg);
        }

        let mut cli = <Self as clap::Parser>::parse_from(filtered);
        cli.recon_all = recon_all;
        cli
    }

    /// Resolve the parsed arguments into a `Configuration`, reading the
    /// environment variables named in spec §6.2.
    pub fn into_configuration(self) -> Result<Configuration, OrchestratorError> {
        let subjects = self.resolve_subjects()?;
        let project_dir = self.resolve_project_dir(&subjects)?;
        let pipeline = self.resolve_pipeline();
        let overwrite = resolve_overwrite_policy();
        let mode = self.resolve_mode();
        let atlas_paths = resolve_atlas_paths();

        Ok(Configuration {
            project_dir,
            subjects,
            pipeline,
            overwrite,
            mode,
            atlas_paths,
        })
    }

    fn resolve_subjects(&self) -> Result<Vec<SubjectRef>, OrchestratorError> {
        if !self.subjects.is_empty() && !self.subject_paths.is_empty() {
            return Err(OrchestratorError::Usage(
                "positional subject paths and --subjects are mutually exclusive".to_string(),
            ));
        }

        let raw: &[String] = if !self.subjects.is_empty() {
            &self.subjects
        } else {
            &self.subject_paths
        };

        if raw.is_empty() {
            return Err(OrchestratorError::Usage(
                "no subjects supplied: pass subject paths or --subjects <id1,id2,...>".to_string(),
            ));
        }

        let mut subjects = Vec::with_capacity(raw.len());
        for entry in raw {
            let subject = SubjectRef::resolve(entry)
                .map_err(|e| OrchestratorError::Usage(format!("invalid subject '{entry}': {e}")))?;
            if subjects.contains(&subject) {
                return Err(OrchestratorError::Usage(format!(
                    "duplicate subject '{subject}' in invocation"
                )));
            }
            subjects.push(subject);
        }
        Ok(subjects)
    }

    /// When positional `<project_root>/sub-<id>` paths are given, the
    /// project root is their shared parent directory. When `--subjects`
    /// is used, the project root comes from `PROJECT_DIR_NAME` instead
    /// (spec §6.1/§6.2): resolved here as that variable naming the
    /// project directory directly.
    fn resolve_project_dir(&self, subjects: &[SubjectRef]) -> Result<PathBuf, OrchestratorError> {
        if !self.subjects.is_empty() {
            return std::env::var("PROJECT_DIR_NAME")
                .map(PathBuf::from)
                .map_err(|_| {
                    OrchestratorError::Usage(
                        "--subjects requires PROJECT_DIR_NAME to name the project root".to_string(),
                    )
                });
        }

        let first = self
            .subject_paths
            .first()
            .ok_or_else(|| OrchestratorError::Usage("no subject path supplied".to_string()))?;

        let parent = Path::new(first)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| {
                OrchestratorError::Usage(format!(
                    "subject path '{first}' has no parent project directory"
                ))
            })?;

        let project_dir = std::fs::canonicalize(parent).unwrap_or_else(|_| parent.to_path_buf());

        for path in &self.subject_paths[1..] {
            let sibling_parent = Path::new(path).parent().unwrap_or(Path::new(""));
            let sibling = std::fs::canonicalize(sibling_parent).unwrap_or_else(|_| sibling_parent.to_path_buf());
            if sibling != project_dir {
                return Err(OrchestratorError::Usage(format!(
                    "subject paths do not share a common project root ({} vs {})",
                    project_dir.display(),
                    sibling.display()
                )));
            }
        }

        let _ = subjects;
        Ok(project_dir)
    }

    fn resolve_pipeline(&self) -> PipelineFlags {
        if self.recon_only {
            return PipelineFlags {
                convert_dicom: false,
                create_m2m: false,
                run_recon: true,
                run_tissue: false,
            };
        }

        PipelineFlags {
            convert_dicom: self.convert_dicom,
            create_m2m: self.create_m2m,
            run_recon: self.recon_all,
            run_tissue: self.run_tissue,
        }
    }

    fn resolve_mode(&self) -> ExecutionMode {
        if self.parallel {
            ExecutionMode::Parallel {
                cores_hint: self.cores,
            }
        } else {
            ExecutionMode::Sequential
        }
    }
}

/// `OVERWRITE`/`PROMPT_OVERWRITE` per spec §6.2: overwrite is off and
/// prompting is on by default.
fn resolve_overwrite_policy() -> OverwritePolicy {
    let overwrite = std::env::var("OVERWRITE")
        .map(|v| matches!(v.as_str(), "true" | "1"))
        .unwrap_or(false);
    let prompt = std::env::var("PROMPT_OVERWRITE")
        .map(|v| !matches!(v.as_str(), "false" | "0"))
        .unwrap_or(true);
    OverwritePolicy::new(overwrite, prompt)
}

/// `CHARM_ATLAS_DIR`, if set, is the one path the Atlas/Config Gate (C9)
/// requires before admitting CHARM; unset means nothing is gated.
fn resolve_atlas_paths() -> Vec<PathBuf> {
    std::env::var("CHARM_ATLAS_DIR")
        .map(|dir| vec![PathBuf::from(dir)])
        .unwrap_or_default()
}
