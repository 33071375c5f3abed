//! Spec §4.7: in Parallel mode, DICOM/RECON/TISSUE may run concurrently
//! across subjects, but CHARM is always a barrier — one subject at a time,
//! never overlapping with another subject's CHARM.
//!
//! The fake `charm` script takes a lock file next to itself; if a second
//! invocation ever observes the lock already held, it fails instead of
//! waiting. A scheduler that let CHARM run concurrently would make this
//! test flaky-failing; the real one never does, so every subject succeeds.

use serial_test::serial;
use tempfile::TempDir;

use structural::config::{Configuration, ExecutionMode, PipelineFlags};
use structural::job::{AggregateVerdict, SubjectJob};
use structural::layout;
use structural::logger::{ConsoleSink, LoggerConfig};
use structural::overwrite::{FixedResponse, OverwritePolicy};
use structural::scheduler;
use structural::subject::SubjectRef;

use crate::support::{dcm2niix_seeding_script, FakeStageDir, TISSUE_SUCCESS};

const RECON_SUCCESS: &str = "echo \"recon-all -subjid sub finished without error\"\nexit 0\n";
const CHARM_WITH_LOCK: &str = "\
set -e
self_dir=$(dirname \"$0\")
lock=\"$self_dir/charm.lock\"
if [ -e \"$lock\" ]; then
  echo 'charm overlap detected'
  exit 1
fi
touch \"$lock\"
sleep 0.2
id=\"$1\"
mkdir -p \"m2m_$id/segmentation\"
touch \"m2m_$id/segmentation/Labeling.nii.gz\"
rm -f \"$lock\"
echo 'charm done'
";

#[test]
#[serial]
fn charm_never_overlaps_across_subjects() {
    let fake = FakeStageDir::new().unwrap();
    fake.write("dcm2niix", &dcm2niix_seeding_script("sub_t1_mprage", None))
        .unwrap();
    fake.write("charm", CHARM_WITH_LOCK).unwrap();
    fake.write("recon-all", RECON_SUCCESS).unwrap();
    fake.write("tissue_analyzer", TISSUE_SUCCESS).unwrap();
    fake.install_path();

    let tmp = TempDir::new().unwrap();
    let project_dir = tmp.path().join("proj");
    let subjects: Vec<SubjectRef> = ["101", "102", "103"]
        .iter()
        .map(|id| SubjectRef::new(*id).unwrap())
        .collect();
    let layout = layout::materialize(&project_dir, &subjects).unwrap();

    let config = Configuration {
        project_dir,
        subjects: subjects.clone(),
        pipeline: PipelineFlags {
            convert_dicom: true,
            create_m2m: true,
            run_recon: true,
            run_tissue: true,
        },
        overwrite: OverwritePolicy::new(false, false),
        mode: ExecutionMode::Parallel { cores_hint: Some(3) },
        atlas_paths: Vec::new(),
    };

    let console = ConsoleSink::new(true);
    let running = scheduler::new_running_flag();
    let jobs: Vec<SubjectJob> = subjects
        .iter()
        .map(|subject| {
            SubjectJob::create(
                subject.clone(),
                layout.clone(),
                config.pipeline,
                config.overwrite,
                LoggerConfig::from_env(),
                console.clone(),
                false,
                running.clone(),
            )
            .unwrap()
        })
        .collect();

    let outcomes = scheduler::run(jobs, &config, &FixedResponse(false));
    assert_eq!(outcomes.len(), 3);
    for outcome in &outcomes {
        assert_eq!(
            outcome.verdict,
            AggregateVerdict::Success,
            "subject {} did not fully succeed: {:?}",
            outcome.subject,
            outcome.stage_outcomes
        );
    }
}
