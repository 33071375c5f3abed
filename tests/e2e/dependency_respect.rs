//! Spec §8 dependency-respect invariant: a stage whose upstream FAILED is
//! never started at all, while an unrelated stage with no such dependency
//! still runs to completion.

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

use crate::support::{dcm2niix_seeding_script, FakeStageDir, TISSUE_SUCCESS};

const CHARM_FAILS: &str = "echo 'charm blew up'\nexit 1\n";
const RECON_SUCCESS: &str = "echo \"recon-all -subjid sub-101 finished without error\"\nexit 0\n";

#[test]
#[serial]
fn tissue_is_not_started_when_charm_fails() {
    let fake = FakeStageDir::new().unwrap();
    fake.write("dcm2niix", &dcm2niix_seeding_script("sub101_t1_mprage", None))
        .unwrap();
    fake.write("charm", CHARM_FAILS).unwrap();
    fake.write("recon-all", RECON_SUCCESS).unwrap();
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

    let outcomes = scheduler::run(vec![job], &config, &FixedResponse(false));
    let outcome = &outcomes[0];

    let charm = outcome.stage_outcomes.iter().find(|o| o.stage == StageName::Charm).unwrap();
    assert_eq!(charm.verdict, Verdict::Failed);

    let tissue = outcome.stage_outcomes.iter().find(|o| o.stage == StageName::Tissue).unwrap();
    assert_eq!(tissue.verdict, Verdict::Failed);
    assert!(tissue.detail.contains("not started"));

    // RECON only depends on DICOM, which succeeded, so it is unaffected by
    // CHARM's failure.
    let recon = outcome.stage_outcomes.iter().find(|o| o.stage == StageName::Recon).unwrap();
    assert_eq!(recon.verdict, Verdict::Success);

    assert_eq!(outcome.verdict, structural::job::AggregateVerdict::Failed);
}
