//! Scheduler (C7, spec §4.7): Sequential vs. Parallel execution, with the
//! CHARM barrier that keeps segmentation serial across subjects even when
//! the rest of the pipeline runs concurrently.
//!
//! Grounded in the teacher's plain-thread worker model (no async runtime
//! anywhere in `loom`): Parallel mode is implemented with
//! `std::thread::scope`, not a task pool or executor.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::config::{Configuration, ExecutionMode};
use crate::job::{SubjectJob, SubjectOutcome};
use crate::overwrite::PromptChannel;
use crate::stage::StageName;

/// Environment variables the external stages read for their own internal
/// thread pools (spec §4.7: "the scheduler sets these so a single-threaded
/// orchestrator run still lets each external tool use all available
/// cores").
const THREAD_ENV_VARS: [&str; 6] = [
    "OMP_NUM_THREADS",
    "MKL_NUM_THREADS",
    "OPENBLAS_NUM_THREADS",
    "VECLIB_MAXIMUM_THREADS",
    "ITK_GLOBAL_DEFAULT_NUMBER_OF_THREADS",
    "NUMBA_NUM_THREADS",
];

fn thread_env(value: usize) -> Vec<(&'static str, String)> {
    THREAD_ENV_VARS
        .iter()
        .map(|name| (*name, value.to_string()))
        .collect()
}

/// Run every admitted job to completion under `config.mode`, then collect
/// each one's final `SubjectOutcome`. `prompt` is shared read-only across
/// however many worker threads Parallel mode spawns.
pub fn run(
    jobs: Vec<SubjectJob>,
    config: &Configuration,
    prompt: &(dyn PromptChannel + Sync),
) -> Vec<SubjectOutcome> {
    let mut jobs = jobs;
    match config.mode {
        ExecutionMode::Sequential => run_sequential(&mut jobs, &config.atlas_paths, prompt),
        ExecutionMode::Parallel { cores_hint } => {
            run_parallel(&mut jobs, cores_hint, &config.atlas_paths, prompt)
        }
    }

    jobs.into_iter().map(SubjectJob::finish).collect()
}

fn run_sequential(
    jobs: &mut [SubjectJob],
    atlas_paths: &[std::path::PathBuf],
    prompt: &(dyn PromptChannel + Sync),
) {
    let env = thread_env(Configuration::detected_cores());
    for job in jobs.iter_mut() {
        run_phase(job, StageName::Dicom, &env, atlas_paths, prompt);
        run_phase(job, StageName::Charm, &env, atlas_paths, prompt);
        run_phase(job, StageName::Recon, &env, atlas_paths, prompt);
        run_phase(job, StageName::Tissue, &env, atlas_paths, prompt);
    }
}

/// Parallel mode: DICOM, RECON and TISSUE each run with up to `cap`
/// subjects concurrently; CHARM always runs one subject at a time, in
/// command-line order, as a barrier between the concurrent phases either
/// side of it (spec §4.7).
fn run_parallel(
    jobs: &mut [SubjectJob],
    cores_hint: Option<usize>,
    atlas_paths: &[std::path::PathBuf],
    prompt: &(dyn PromptChannel + Sync),
) {
    let cap = cores_hint
        .unwrap_or_else(Configuration::detected_cores)
        .max(1)
        .min(jobs.len().max(1));
    // Each concurrent child gets a one-core budget; the scheduler itself
    // is what supplies the parallelism.
    let env = thread_env(1);

    run_phase_bounded(jobs, cap, |job| {
        run_phase(job, StageName::Dicom, &env, atlas_paths, prompt)
    });

    for job in jobs.iter_mut() {
        run_phase(job, StageName::Charm, &env, atlas_paths, prompt);
    }

    run_phase_bounded(jobs, cap, |job| {
        run_phase(job, StageName::Recon, &env, atlas_paths, prompt)
    });
    run_phase_bounded(jobs, cap, |job| {
        run_phase(job, StageName::Tissue, &env, atlas_paths, prompt)
    });
}

/// Split `jobs` into `cap` roughly-even, disjoint slices and run `f` over
/// each slice's jobs in its own thread, sequentially within the slice.
/// `std::thread::scope` makes the end of this call a barrier: every slice
/// has finished its phase before the next phase starts.
fn run_phase_bounded<F>(jobs: &mut [SubjectJob], cap: usize, f: F)
where
    F: Fn(&mut SubjectJob) + Sync,
{
    if jobs.is_empty() {
        return;
    }
    let chunk_size = jobs.len().div_ceil(cap).max(1);
    std::thread::scope(|scope| {
        for chunk in jobs.chunks_mut(chunk_size) {
            let f = &f;
            scope.spawn(move || {
                for job in chunk {
                    f(job);
                }
            });
        }
    });
}

fn run_phase(
    job: &mut SubjectJob,
    stage: StageName,
    env: &[(&str, String)],
    atlas_paths: &[std::path::PathBuf],
    prompt: &dyn PromptChannel,
) {
    let result = match stage {
        StageName::Dicom => job.run_dicom(env, prompt),
        StageName::Charm => job.run_charm(env, prompt, atlas_paths),
        StageName::Recon => job.run_recon(env, prompt),
        StageName::Tissue => job.run_tissue(env, prompt),
    };
    if let Err(err) = result {
        job.record_internal_error(stage, &err);
    }
}

/// Cooperative cancellation flag shared with a `ctrlc` handler (spec §4.8):
/// the stage runner polls this between output reads and terminates the
/// running child when it flips to `false`.
pub fn new_running_flag() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(true))
}
