//! Spec §4.4/§8: a RECON success marker in the captured output overrides a
//! non-zero exit code — the classifier checks markers before exit status.

use serial_test::serial;
use tempfile::TempDir;

use structural::config::{Configuration, ExecutionMode, PipelineFlags};
use structural::job::SubjectJob;
use structural::layout;
use structural::logger::{ConsoleSink, LoggerConfig};
use structural::overwrite::{FixedResponse, OverwritePolicy};
use structural::scheduler;
use structural::stage::{StageName, Verdict};
use structural::subject::SubjectRef;

use crate::support::{
    dcm2niix_seeding_script, FakeStageDir, CHARM_SUCCESS, RECON_ALL_PLAIN_FAILURE,
    RECON_ALL_SUCCESS_MARKER_NONZERO_EXIT, TISSUE_SUCCESS,
};

fn run_one(recon_script: &str) -> Vec<structural::job::SubjectOutcome> {
    let fake = FakeStageDir::new().unwrap();
    fake.write("dcm2niix", &dcm2niix_seeding_script("sub101_t1_mprage", None))
        .unwrap();
    fake.write("charm", CHARM_SUCCESS).unwrap();
    fake.write("recon-all", recon_script).unwrap();
    fake.write("tissue_analyzer", TISSUE_SUCCESS).unwrap();
    fake.install_path();

    let tmp = TempDir::new().unwrap();
    let project_dir = tmp.path().join("proj");
    let subject = SubjectRef::new("101").unwrap();
    let layout = layout::materialize(&project_dir, &[subject.clone()]).unwrap();

    let config = Configuration {
        project_dir,
        subjects: vec![subject.clone()],
        pipeline: PipelineFlags {
            convert_dicom: true,
            create_m2m: false,
            run_recon: true,
            run_tissue: false,
        },
        overwrite: OverwritePolicy::new(false, false),
        mode: ExecutionMode::Sequential,
        atlas_paths: Vec::new(),
    };

    let running = scheduler::new_running_flag();
    let console = ConsoleSink::new(false);
    let job = SubjectJob::create(
        subject,
        layout,
        config.pipeline,
        config.overwrite,
        LoggerConfig::from_env(),
        console,
        false,
        running,
    )
    .unwrap();

    scheduler::run(vec![job], &config, &FixedResponse(false))
}

#[test]
#[serial]
fn success_marker_overrides_nonzero_recon_exit() {
    let outcomes = run_one(RECON_ALL_SUCCESS_MARKER_NONZERO_EXIT);
    let recon = outcomes[0]
        .stage_outcomes
        .iter()
        .find(|o| o.stage == StageName::Recon)
        .unwrap();
    assert_eq!(recon.verdict, Verdict::Success);
    assert!(recon.detail.contains("success marker matched"));
}

#[test]
#[serial]
fn plain_failure_with_no_markers_fails() {
    let outcomes = run_one(RECON_ALL_PLAIN_FAILURE);
    let recon = outcomes[0]
        .stage_outcomes
        .iter()
        .find(|o| o.stage == StageName::Recon)
        .unwrap();
    assert_eq!(recon.verdict, Verdict::Failed);
}
