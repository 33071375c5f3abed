//! Subject Job (C6, spec §4.6): the per-subject state machine
//! `CREATED → LAYOUT_READY → {DICOM*} → {CHARM*} → {RECON*} → {TISSUE*}
//! → DONE(ok|fail)`.
//!
//! Grounded on the teacher's `models::stage::StageStatus` state-machine
//! shape, adapted from a single resumable stage to the fixed four-stage
//! pipeline this system drives per subject. The scheduler (C7) calls the
//! `run_*` methods one phase at a time rather than a single `run()`, so
//! Parallel mode can interleave phases across subjects with the CHARM
//! barrier in between.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Result;

use crate::atlas::{self, GateResult};
use crate::config::PipelineFlags;
use crate::dicom;
use crate::layout::ProjectLayout;
use crate::logger::{ConsoleSink, LoggerConfig, SubjectLogger};
use crate::monitor::ResourceMonitor;
use crate::overwrite::{OverwritePolicy, PromptChannel};
use crate::stage::{self, StageName, StageOutcome, StageSpec, Verdict};
use crate::subject::SubjectRef;

const DICOM_EXECUTABLE: &str = "dcm2niix";
const CHARM_EXECUTABLE: &str = "charm";
const RECON_EXECUTABLE: &str = "recon-all";
const TISSUE_EXECUTABLE: &str = "tissue_analyzer";

/// Final record for one subject (spec §3 `SubjectOutcome`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateVerdict {
    Success,
    Failed,
}

#[derive(Debug, Clone)]
pub struct SubjectOutcome {
    pub subject: SubjectRef,
    pub stage_outcomes: Vec<StageOutcome>,
    pub verdict: AggregateVerdict,
    pub log_path: PathBuf,
}

/// Drives one subject through its ordered stage composition.
pub struct SubjectJob {
    subject: SubjectRef,
    layout: ProjectLayout,
    pipeline: PipelineFlags,
    overwrite: OverwritePolicy,
    logger: SubjectLogger,
    log_path: PathBuf,
    monitor: ResourceMonitor,
    outcomes: Vec<StageOutcome>,
    is_tty: bool,
    running: Arc<AtomicBool>,
}

impl SubjectJob {
    pub fn create(
        subject: SubjectRef,
        layout: ProjectLayout,
        pipeline: PipelineFlags,
        overwrite: OverwritePolicy,
        logger_config: LoggerConfig,
        console: Arc<ConsoleSink>,
        is_tty: bool,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let logs_dir = layout.logs_root(&subject);
        let (logger, log_path) =
            SubjectLogger::create(&logs_dir, &subject.bids_name(), logger_config, console)?;
        let monitor = ResourceMonitor::new(layout.project_dir.join("derivatives"));

        logger.info(&format!("subject {} admitted (LAYOUT_READY)", subject));

        Ok(Self {
            subject,
            layout,
            pipeline,
            overwrite,
            logger,
            log_path,
            monitor,
            outcomes: Vec::new(),
            is_tty,
            running,
        })
    }

    pub fn subject(&self) -> &SubjectRef {
        &self.subject
    }

    fn verdict_of(&self, stage: StageName) -> Option<Verdict> {
        self.outcomes
            .iter()
            .find(|o| o.stage == stage)
            .map(|o| o.verdict)
    }

    /// Run one stage, recording its outcome. If `upstream` names a stage
    /// this one depends on and that stage ran and did not succeed, the
    /// dependent stage is not started at all (spec §8 dependency-respect
    /// invariant) and a synthetic `not_started` outcome is recorded.
    fn run_stage(
        &mut self,
        spec: StageSpec,
        env_overrides: &[(&str, String)],
        prompt: &dyn PromptChannel,
        upstream: Option<StageName>,
    ) -> Result<()> {
        if let Some(upstream) = upstream {
            if let Some(verdict) = self.verdict_of(upstream) {
                if !verdict.permits_dependents() {
                    self.logger.warn(&format!(
                        "{} not started: upstream {upstream} did not succeed",
                        spec.name
                    ));
                    self.outcomes
                        .push(StageOutcome::not_started(spec.name, upstream));
                    return Ok(());
                }
            }
        }

        let outcome = stage::run(
            &spec,
            &self.logger,
            &self.overwrite,
            self.is_tty,
            prompt,
            &self.monitor,
            env_overrides,
            &self.running,
        )?;
        self.outcomes.push(outcome);
        Ok(())
    }

    pub fn run_dicom(&mut self, env_overrides: &[(&str, String)], prompt: &dyn PromptChannel) -> Result<()> {
        if !self.pipeline.convert_dicom {
            return Ok(());
        }

        let t1_dicom_dir = self.layout.dicom_root(&self.subject, "T1w");
        // dcm2niix emits its .nii.gz/.json pairs alongside the DICOM source
        // (spec §6.3 preamble), i.e. back into the same T1w/T2w/dicom trees
        // `dicom::canonicalize` scans afterwards, not into `anat/` directly.
        // `output_root` still names `anat/` since that's the directory the
        // overwrite policy and failure cleanup actually own for this stage.
        let subject_sourcedata_root = self
            .layout
            .sourcedata_root()
            .join(self.subject.bids_name());
        let spec = StageSpec {
            name: StageName::Dicom,
            inputs: vec![t1_dicom_dir],
            output_root: self.layout.anat_root(&self.subject),
            executable: DICOM_EXECUTABLE.to_string(),
            args: vec![subject_sourcedata_root.to_string_lossy().into_owned()],
            working_dir: None,
        };

        self.run_stage(spec, env_overrides, prompt, None)?;

        if self.verdict_of(StageName::Dicom) == Some(Verdict::Success) {
            dicom::canonicalize(
                &self.layout,
                &self.subject,
                &self.overwrite,
                self.is_tty,
                prompt,
                &self.logger,
            )?;
        }

        Ok(())
    }

    pub fn run_charm(
        &mut self,
        env_overrides: &[(&str, String)],
        prompt: &dyn PromptChannel,
        atlas_paths: &[PathBuf],
    ) -> Result<()> {
        if !self.pipeline.create_m2m {
            return Ok(());
        }

        if let GateResult::Missing(path) = atlas::check(atlas_paths) {
            self.logger
                .warn(&format!("CHARM atlas/config gate failed: missing {}", path.display()));
            self.outcomes
                .push(StageOutcome::skipped_precondition(StageName::Charm, &path));
            return Ok(());
        }

        let t1_path = self.layout.anat_root(&self.subject).join(format!(
            "sub-{}_T1w.nii.gz",
            self.subject.id()
        ));
        let m2m_root = self.layout.m2m_root(&self.subject);
        // charm writes its `m2m_<id>/` output tree relative to the current
        // directory rather than taking an explicit destination argument, so
        // the child is spawned in m2m_root's parent (spec §6.3 on-disk
        // layout: `derivatives/SimNIBS/sub-<id>/m2m_<id>/`).
        let charm_working_dir = m2m_root.parent().map(Path::to_path_buf);
        let spec = StageSpec {
            name: StageName::Charm,
            inputs: vec![t1_path.clone()],
            output_root: m2m_root,
            executable: CHARM_EXECUTABLE.to_string(),
            args: vec![self.subject.id().to_string(), t1_path.to_string_lossy().into_owned()],
            working_dir: charm_working_dir,
        };

        self.run_stage(spec, env_overrides, prompt, Some(StageName::Dicom))
    }

    pub fn run_recon(&mut self, env_overrides: &[(&str, String)], prompt: &dyn PromptChannel) -> Result<()> {
        if !self.pipeline.run_recon {
            return Ok(());
        }

        let t1_path = self.layout.anat_root(&self.subject).join(format!(
            "sub-{}_T1w.nii.gz",
            self.subject.id()
        ));
        let spec = StageSpec {
            name: StageName::Recon,
            inputs: vec![t1_path.clone()],
            output_root: self.layout.freesurfer_root(&self.subject),
            executable: RECON_EXECUTABLE.to_string(),
            args: vec![
                "-subjid".to_string(),
                self.subject.bids_name(),
                "-i".to_string(),
                t1_path.to_string_lossy().into_owned(),
                "-all".to_string(),
            ],
            working_dir: None,
        };

        self.run_stage(spec, env_overrides, prompt, Some(StageName::Dicom))
    }

    pub fn run_tissue(&mut self, env_overrides: &[(&str, String)], prompt: &dyn PromptChannel) -> Result<()> {
        if !self.pipeline.run_tissue {
            return Ok(());
        }

        let labeling_path = self
            .layout
            .m2m_root(&self.subject)
            .join("segmentation")
            .join("Labeling.nii.gz");

        let spec = StageSpec {
            name: StageName::Tissue,
            inputs: vec![labeling_path.clone()],
            output_root: self.layout.tissue_analysis_root(&self.subject),
            executable: TISSUE_EXECUTABLE.to_string(),
            args: vec![
                self.subject.bids_name(),
                labeling_path.to_string_lossy().into_owned(),
            ],
            working_dir: None,
        };

        self.run_stage(spec, env_overrides, prompt, Some(StageName::Charm))
    }

    /// Record a stage's own (unexpected, non-classifier) error — a process
    /// spawn/wait failure, not an `EXTERNAL_FAILURE` — as a failed outcome
    /// so the job can still finalize. Spec §7 `INTERNAL`: "the
    /// orchestrator falls back to stderr-only logging and continues where
    /// possible."
    pub fn record_internal_error(&mut self, stage: StageName, err: &anyhow::Error) {
        eprintln!("internal error running {stage} for {}: {err:#}", self.subject);
        self.logger
            .error(&format!("internal error running {stage}: {err:#}"));
        self.outcomes.push(StageOutcome {
            stage,
            verdict: Verdict::Failed,
            duration: std::time::Duration::ZERO,
            log_path: None,
            post_snapshot: None,
            detail: format!("internal error: {err:#}"),
        });
    }

    /// Finalize the job: aggregate verdict is SUCCESS iff every stage the
    /// pipeline actually required is SUCCESS or SKIPPED_EXISTS.
    pub fn finish(self) -> SubjectOutcome {
        let required = [
            (StageName::Dicom, self.pipeline.convert_dicom),
            (StageName::Charm, self.pipeline.create_m2m),
            (StageName::Recon, self.pipeline.run_recon),
            (StageName::Tissue, self.pipeline.run_tissue),
        ];

        let succeeded = required.iter().all(|(name, required)| {
            if !required {
                return true;
            }
            self.outcomes
                .iter()
                .find(|o| o.stage == *name)
                .map(|o| o.verdict.counts_as_success())
                .unwrap_or(false)
        });

        let verdict = if succeeded {
            AggregateVerdict::Success
        } else {
            AggregateVerdict::Failed
        };

        self.logger
            .info(&format!("subject {} done: {verdict:?}", self.subject));

        SubjectOutcome {
            subject: self.subject,
            stage_outcomes: self.outcomes,
            verdict,
            log_path: self.log_path,
        }
    }
}
