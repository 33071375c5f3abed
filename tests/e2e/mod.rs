//! End-to-end scenario tests: a full `SubjectJob`/scheduler run against
//! fake stage executables on `PATH`, exercising the scenarios of spec §8.
//!
//! Grounded in the teacher's `tests/e2e/helpers/git.rs` pattern of shelling
//! out to a real subprocess rather than mocking the collaborator.

#[path = "../support/fake_stage.rs"]
mod support;

mod cancellation;
mod dependency_respect;
mod fresh_pipeline;
mod overwrite_skip;
mod parallel_charm_barrier;
mod success_marker_precedence;
