//! Spec §8 scenario 1: a fresh single-subject run through all four stages,
//! sequential mode, with every external tool succeeding.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serial_test::serial;
use tempfile::TempDir;

use structural::config::{Configuration, ExecutionMode, PipelineFlags};
use structural::job::{AggregateVerdict, SubjectJob};
use structural::layout;
use structural::logger::{ConsoleSink, LoggerConfig};
use structural::overwrite::{FixedResponse, OverwritePolicy};
use structural::scheduler;
use structural::stage::{StageName, Verdict};
use structural::subject::SubjectRef;

use crate::support::{dcm2niix_seeding_script, FakeStageDir, CHARM_SUCCESS, TISSUE_SUCCESS};

const RECON_SUCCESS: &str = "echo \"recon-all -subjid sub-101 finished without error\"\nexit 0\n";

#[test]
#[serial]
fn fresh_subject_runs_every_stage_to_success() {
    let fake = FakeStageDir::new().unwrap();
    fake.write("dcm2niix", &dcm2niix_seeding_script("sub101_t1_mprage", Some("sub101_t2_tse")))
        .unwrap();
    fake.write("charm", CHARM_SUCCESS).unwrap();
    fake.write("recon-all", RECON_SUCCESS).unwrap();
    fake.write("tissue_analyzer", TISSUE_SUCCESS).unwrap();
    fake.install_path();

    let tmp = TempDir::new().unwrap();
    let project_dir = tmp.path().join("proj");
    let subject = SubjectRef::new("101").unwrap();
    let layout = layout::materialize(&project_dir, &[subject.clone()]).unwrap();

    let config = Configuration {
        project_dir: project_dir.clone(),
        subjects: vec![subject.clone()],
        pipeline: PipelineFlags {
            convert_dicom: true,
            create_m2m: true,
            run_recon: true,
            run_tissue: true,
        },
        overwrite: OverwritePolicy::new(false, false),
        mode: ExecutionMode::Sequential,
        atlas_paths: Vec::new(),
    };

    let running = scheduler::new_running_flag();
    let console = ConsoleSink::new(false);
    let job = SubjectJob::create(
        subject.clone(),
        layout.clone(),
        config.pipeline,
        config.overwrite,
        LoggerConfig::from_env(),
        console,
        false,
        running,
    )
    .unwrap();

    let outcomes = scheduler::run(vec![job], &config, &FixedResponse(false));
    assert_eq!(outcomes.len(), 1);
    let outcome = &outcomes[0];
    assert_eq!(outcome.verdict, AggregateVerdict::Success);

    for stage in [StageName::Dicom, StageName::Charm, StageName::Recon, StageName::Tissue] {
        let recorded = outcome
            .stage_outcomes
            .iter()
            .find(|o| o.stage == stage)
            .unwrap_or_else(|| panic!("no outcome recorded for {stage}"));
        assert_eq!(recorded.verdict, Verdict::Success, "{stage} did not succeed: {recorded:?}");
    }

    assert!(layout.anat_root(&subject).join("sub-101_T1w.nii.gz").is_file());
    assert!(layout.anat_root(&subject).join("sub-101_T2w.nii.gz").is_file());
    assert!(layout
        .m2m_root(&subject)
        .join("segmentation")
        .join("Labeling.nii.gz")
        .is_file());
}
