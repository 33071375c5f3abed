//! Stage Runner (C4, spec §4.4) and the External Stage Contract resolution
//! helper (C10, spec §4.10).

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use wait_timeout::ChildExt;

use crate::logger::SubjectLogger;
use crate::monitor::ResourceMonitor;
use crate::overwrite::{Decision, OverwritePolicy, PromptChannel};

use super::markers::{shared_markers, table_for};
use super::types::{StageName, StageOutcome, StageSpec, Verdict};

/// Grace window between a SIGTERM and the follow-up SIGKILL on
/// cancellation (spec §5: "a short grace window").
const TERMINATION_GRACE_WINDOW: Duration = Duration::from_secs(5);

/// How often the output-draining loop wakes to re-check the cancellation
/// flag even with no output pending.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Resolve `name` to an executable on `PATH`, per C10 ("must be an
/// executable file on the resolved search path").
pub fn resolve_executable(name: &str) -> Result<std::path::PathBuf> {
    which::which(name).with_context(|| format!("stage executable '{name}' not found on PATH"))
}

/// Run one stage to completion, following the algorithm of spec §4.4.
pub fn run(
    spec: &StageSpec,
    logger: &SubjectLogger,
    overwrite: &OverwritePolicy,
    is_tty: bool,
    prompt: &dyn PromptChannel,
    monitor: &ResourceMonitor,
    env_overrides: &[(&str, String)],
    running: &Arc<AtomicBool>,
) -> Result<StageOutcome> {
    let stage = spec.name;

    // Step 1: precondition check.
    for input in &spec.inputs {
        if !input.exists() {
            logger.warn(&format!(
                "{stage}: precondition failed, missing input {}",
                input.display()
            ));
            return Ok(StageOutcome::skipped_precondition(stage, input));
        }
        if std::fs::File::open(input).is_err() {
            logger.warn(&format!(
                "{stage}: precondition failed, unreadable input {}",
                input.display()
            ));
            return Ok(StageOutcome::skipped_precondition(stage, input));
        }
    }

    // Step 2: output gate.
    let decision = overwrite.decide(&spec.output_root, is_tty, prompt)?;
    if decision == Decision::Skip {
        logger.info(&format!(
            "{stage}: output {} already exists, skipping",
            spec.output_root.display()
        ));
        return Ok(StageOutcome::skipped_exists(stage));
    }

    if !running.load(Ordering::SeqCst) {
        return Ok(abort(stage, spec, logger));
    }

    // Step 3: pre-snapshot.
    let _pre = monitor.snapshot(&format!("before {stage}"), logger);

    logger.stage_boundary(&format!("{stage} starting"));
    let start = Instant::now();

    // Step 4: spawn.
    let executable = resolve_executable(&spec.executable)?;
    let mut command = Command::new(executable);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(working_dir) = &spec.working_dir {
        command.current_dir(working_dir);
    }
    for (key, value) in env_overrides {
        command.env(key, value);
    }

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to spawn stage {stage} ({})", spec.executable))?;

    // Step 5: stream stdout+stderr line by line, merged chronologically
    // by arrival order on a shared channel (real interleaving is the best
    // any merged capture can offer without OS-level pipe fusion).
    let (tx, rx) = mpsc::channel::<String>();
    spawn_line_reader(child.stdout.take(), tx.clone());
    spawn_line_reader(child.stderr.take(), tx.clone());
    drop(tx);

    let mut captured = String::new();
    let outcome_verdict;

    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(line) => {
                logger.child_line(&line);
                captured.push_str(&line);
                captured.push('\n');
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if !running.load(Ordering::SeqCst) {
                    drain_remaining(&rx, logger, &mut captured);
                    terminate_child(&mut child);
                    let duration = start.elapsed();
                    logger.stage_boundary(&format!("{stage} ABORTED after {duration:?}"));
                    cleanup_output(&spec.output_root);
                    return Ok(StageOutcome {
                        stage,
                        verdict: Verdict::Aborted,
                        duration,
                        log_path: None,
                        post_snapshot: Some(monitor.snapshot(&format!("after {stage}"), logger)),
                        detail: "cancelled by operator".to_string(),
                    });
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    // Step 6: classify. Step 7: post-snapshot happens after classification
    // so the snapshot label always reflects the stage's actual outcome.
    let status = child.wait().context("failed to wait for stage child")?;
    let exit_code = status.code();
    outcome_verdict = classify(stage, &captured, status.success());

    let duration = start.elapsed();
    let post = monitor.snapshot(&format!("after {stage}"), logger);

    match outcome_verdict {
        Verdict::Success => {
            logger.stage_boundary(&format!("{stage} finished in {duration:?}"));
        }
        _ => {
            logger.error(&format!(
                "{stage} FAILED after {duration:?} (exit code {exit_code:?})"
            ));
            // Step 8: cleanup on failure.
            cleanup_output(&spec.output_root);
        }
    }

    Ok(StageOutcome {
        stage,
        verdict: outcome_verdict,
        duration,
        log_path: None,
        post_snapshot: Some(post),
        detail: classify_detail(stage, &captured, exit_code),
    })
}

fn abort(stage: StageName, spec: &StageSpec, logger: &SubjectLogger) -> StageOutcome {
    logger.warn(&format!("{stage} aborted before starting"));
    cleanup_output(&spec.output_root);
    StageOutcome {
        stage,
        verdict: Verdict::Aborted,
        duration: Duration::ZERO,
        log_path: None,
        post_snapshot: None,
        detail: "cancelled before start".to_string(),
    }
}

fn spawn_line_reader(pipe: Option<impl std::io::Read + Send + 'static>, tx: mpsc::Sender<String>) {
    let Some(pipe) = pipe else { return };
    std::thread::spawn(move || {
        let reader = BufReader::new(pipe);
        for line in reader.lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
}

fn drain_remaining(rx: &mpsc::Receiver<String>, logger: &SubjectLogger, captured: &mut String) {
    while let Ok(line) = rx.recv_timeout(Duration::from_millis(50)) {
        logger.child_line(&line);
        captured.push_str(&line);
        captured.push('\n');
    }
}

/// SIGTERM, wait up to the grace window, then SIGKILL (spec §5).
fn terminate_child(child: &mut Child) {
    let pid = Pid::from_raw(child.id() as i32);
    let _ = signal::kill(pid, Signal::SIGTERM);

    match child.wait_timeout(TERMINATION_GRACE_WINDOW) {
        Ok(Some(_)) => {}
        _ => {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn cleanup_output(output_root: &Path) {
    if output_root.exists() {
        let _ = std::fs::remove_dir_all(output_root);
    }
}

/// The classifier precedence of spec §4.4 step 6.
fn classify(stage: StageName, captured_output: &str, exit_success: bool) -> Verdict {
    let table = table_for(stage);
    let shared = shared_markers();

    if table.success.iter().any(|m| captured_output.contains(m)) {
        return Verdict::Success;
    }
    if shared
        .fatal_system
        .iter()
        .any(|m| captured_output.contains(m))
    {
        return Verdict::Failed;
    }
    if shared
        .missing_interpreter
        .iter()
        .any(|re| re.is_match(captured_output))
    {
        return Verdict::Failed;
    }
    if table.failure.iter().any(|re| re.is_match(captured_output)) {
        return Verdict::Failed;
    }

    if exit_success {
        Verdict::Success
    } else {
        Verdict::Failed
    }
}

fn classify_detail(stage: StageName, captured_output: &str, exit_code: Option<i32>) -> String {
    let table = table_for(stage);
    if let Some(marker) = table.success.iter().find(|m| captured_output.contains(**m)) {
        return format!("success marker matched: '{marker}'");
    }
    let shared = shared_markers();
    if let Some(marker) = shared
        .fatal_system
        .iter()
        .find(|m| captured_output.contains(**m))
    {
        return format!("fatal system marker matched: '{marker}'");
    }
    if shared
        .missing_interpreter
        .iter()
        .any(|re| re.is_match(captured_output))
    {
        return "missing-interpreter marker matched".to_string();
    }
    if let Some(re) = table.failure.iter().find(|re| re.is_match(captured_output)) {
        return format!("failure marker matched: '{}'", re.as_str());
    }
    format!("exit code {exit_code:?}")
}
