use std::process::ExitCode;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};

use structural::cli::Cli;
use structural::config::ExecutionMode;
use structural::job::SubjectJob;
use structural::layout;
use structural::logger::{ConsoleSink, LoggerConfig};
use structural::outcome::RunSummary;
use structural::overwrite::{FixedResponse, InteractivePrompt, OverwritePolicy, PromptChannel};
use structural::scheduler;

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("structural: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = cli
        .into_configuration()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("invalid invocation")?;

    let running = scheduler::new_running_flag();
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("failed to install signal handler")?;
    }

    let project_layout = layout::materialize(&config.project_dir, &config.subjects)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("failed to materialize project layout")?;

    let is_tty = OverwritePolicy::stdin_is_tty();
    let tag_console_lines = matches!(config.mode, ExecutionMode::Parallel { .. }) && config.subjects.len() > 1;
    let console = ConsoleSink::new(tag_console_lines);
    let logger_config = LoggerConfig::from_env();

    let prompt: Box<dyn PromptChannel + Sync> = if is_tty {
        Box::new(InteractivePrompt)
    } else {
        Box::new(FixedResponse(false))
    };

    let mut jobs = Vec::with_capacity(config.subjects.len());
    for subject in &config.subjects {
        let job = SubjectJob::create(
            subject.clone(),
            project_layout.clone(),
            config.pipeline,
            config.overwrite,
            logger_config,
            console.clone(),
            is_tty,
            running.clone(),
        )
        .with_context(|| format!("failed to set up job for subject {subject}"))?;
        jobs.push(job);
    }

    let outcomes = scheduler::run(jobs, &config, prompt.as_ref());
    let summary = RunSummary::from_outcomes(&outcomes);
    println!("{}", summary.render());

    Ok(summary.exit_code())
}
