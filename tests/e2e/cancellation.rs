//! Spec §8 scenario 6: a cancellation signal arriving while a stage's child
//! is running terminates that child, removes its partial output tree, and
//! the stage reports ABORTED.
//!
//! `scheduler::new_running_flag` is the same `Arc<AtomicBool>` a real
//! `ctrlc::set_handler` flips in `main.rs`; this test flips it from a
//! second thread instead of a real signal, while the stage's fake `sleep`
//! child is still running, to exercise the same code path the Stage
//! Runner's poll loop takes on SIGTERM/SIGINT.

use std::sync::atomic::Ordering;
use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;

use structural::job::SubjectJob;
use structural::layout;
use structural::logger::{ConsoleSink, LoggerConfig};
use structural::overwrite::{FixedResponse, OverwritePolicy};
use structural::scheduler;
use structural::stage::Verdict;
use structural::subject::SubjectRef;

use crate::support::FakeStageDir;

const RECON_SLEEPS: &str = "\
set -e
mkdir -p \"$RECON_OUTPUT_DIR\"
touch \"$RECON_OUTPUT_DIR/partial_output\"
sleep 5
echo \"recon-all finished without error\"
";

#[test]
#[serial]
fn cancellation_during_a_running_stage_aborts_and_cleans_up() {
    let fake = FakeStageDir::new().unwrap();
    fake.write("recon-all", RECON_SLEEPS).unwrap();
    fake.install_path();

    let tmp = TempDir::new().unwrap();
    let project_dir = tmp.path().join("proj");
    let subject = SubjectRef::new("101").unwrap();
    let layout = layout::materialize(&project_dir, &[subject.clone()]).unwrap();

    // RECON's precondition is the canonical T1; seed it directly since this
    // test only exercises RECON in isolation.
    std::fs::write(
        layout.anat_root(&subject).join("sub-101_T1w.nii.gz"),
        b"fake-nifti",
    )
    .unwrap();

    let running = scheduler::new_running_flag();
    let console = ConsoleSink::new(false);
    let mut job = SubjectJob::create(
        subject.clone(),
        layout.clone(),
        structural::config::PipelineFlags {
            convert_dicom: false,
            create_m2m: false,
            run_recon: true,
            run_tissue: false,
        },
        OverwritePolicy::new(false, false),
        LoggerConfig::from_env(),
        console,
        false,
        running.clone(),
    )
    .unwrap();

    let cancel_handle = std::thread::spawn({
        let running = running.clone();
        move || {
            std::thread::sleep(Duration::from_millis(400));
            running.store(false, Ordering::SeqCst);
        }
    });

    let env_overrides = [(
        "RECON_OUTPUT_DIR",
        layout.freesurfer_root(&subject).display().to_string(),
    )];
    job.run_recon(&env_overrides, &FixedResponse(false)).unwrap();
    cancel_handle.join().unwrap();

    let outcome = job.finish();
    let recon = outcome
        .stage_outcomes
        .iter()
        .find(|o| o.stage == structural::stage::StageName::Recon)
        .unwrap();
    assert_eq!(recon.verdict, Verdict::Aborted);
    assert_eq!(outcome.verdict, structural::job::AggregateVerdict::Failed);

    // The partial output tree the cancelled child had started writing is
    // gone (spec §4.4 step 8 / §8 scenario 6).
    assert!(!layout.freesurfer_root(&subject).join("partial_output").exists());
}
