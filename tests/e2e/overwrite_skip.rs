//! Spec §8 scenario 2: pre-existing FreeSurfer output, `OVERWRITE` unset
//! and `PROMPT_OVERWRITE=false` → RECON reports SKIPPED_EXISTS while the
//! other stages still run to completion.

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
fn populated_freesurfer_output_is_skipped_not_rerun() {
    let fake = FakeStageDir::new().unwrap();
    fake.write("dcm2niix", &dcm2niix_seeding_script("sub101_t1_mprage", None))
        .unwrap();
    fake.write("charm", CHARM_SUCCESS).unwrap();
    fake.write("recon-all", RECON_SUCCESS).unwrap();
    fake.write("tissue_analyzer", TISSUE_SUCCESS).unwrap();
    fake.install_path();

    let tmp = TempDir::new().unwrap();
    let project_dir = tmp.path().join("proj");
    let subject = SubjectRef::new("101").unwrap();
    let layout = layout::materialize(&project_dir, &[subject.clone()]).unwrap();

    // Pre-populate FreeSurfer's output so the overwrite gate sees it as
    // already produced by an earlier invocation.
    let freesurfer_root = layout.freesurfer_root(&subject);
    std::fs::write(freesurfer_root.join("mri_stub"), b"previously completed recon").unwrap();

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
    let outcome = &outcomes[0];

    let recon_outcome = outcome
        .stage_outcomes
        .iter()
        .find(|o| o.stage == StageName::Recon)
        .unwrap();
    assert_eq!(recon_outcome.verdict, Verdict::SkippedExists);

    // SKIPPED_EXISTS counts as success for aggregation, and the other
    // stages (not pre-populated) still ran to completion.
    assert_eq!(outcome.verdict, AggregateVerdict::Success);
    for stage in [StageName::Dicom, StageName::Charm, StageName::Tissue] {
        let recorded = outcome.stage_outcomes.iter().find(|o| o.stage == stage).unwrap();
        assert_eq!(recorded.verdict, Verdict::Success, "{stage} did not succeed: {recorded:?}");
    }

    // The pre-existing stub was never touched.
    let contents = std::fs::read_to_string(freesurfer_root.join("mri_stub")).unwrap();
    assert_eq!(contents, "previously completed recon");
}
