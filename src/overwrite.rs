//! Overwrite Policy (C2, spec §4.2).

use std::io::{self, IsTerminal, Write};
use std::path::Path;

use anyhow::{Context, Result};

/// Outcome of consulting the overwrite policy for a target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The stage should proceed; any pre-existing target tree has been
    /// deleted already.
    Proceed,
    /// The stage should skip and report `SKIPPED_EXISTS`.
    Skip,
}

/// A pure function of `(overwrite, prompt, is-tty, response channel)`, per
/// the Design Notes: isolating TTY detection here keeps interactive
/// prompts from colliding with background/parallel runs.
pub trait PromptChannel {
    /// Ask a yes/no question; `true` means the user answered y/yes.
    fn ask_yes_no(&self, message: &str) -> bool;
}

/// Prompts on the real terminal via stdin/stdout.
pub struct InteractivePrompt;

impl PromptChannel for InteractivePrompt {
    fn ask_yes_no(&self, message: &str) -> bool {
        print!("{message} [y/N] ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        if io::stdin().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

/// Background/non-interactive callers inject a fixed answer instead of
/// touching a real terminal.
pub struct FixedResponse(pub bool);

impl PromptChannel for FixedResponse {
    fn ask_yes_no(&self, _message: &str) -> bool {
        self.0
    }
}

/// The two boolean knobs of spec §3 `OverwritePolicy`.
#[derive(Debug, Clone, Copy)]
pub struct OverwritePolicy {
    pub overwrite: bool,
    pub prompt: bool,
}

impl OverwritePolicy {
    pub fn new(overwrite: bool, prompt: bool) -> Self {
        Self { overwrite, prompt }
    }

    /// Decide whether to proceed against `target`, using `channel` for any
    /// interactive question and `is_tty` to decide whether one is even
    /// possible. Deletion of the target tree, when it happens, is the
    /// caller's sole responsibility over that path (spec §4.2 invariant:
    /// "atomic with respect to other subjects").
    pub fn decide(
        &self,
        target: &Path,
        is_tty: bool,
        channel: &dyn PromptChannel,
    ) -> Result<Decision> {
        if !is_populated(target) {
            return Ok(Decision::Proceed);
        }

        if self.overwrite {
            remove_tree(target)?;
            return Ok(Decision::Proceed);
        }

        if !self.prompt {
            return Ok(Decision::Skip);
        }

        if !is_tty {
            return Ok(Decision::Skip);
        }

        let message = format!("'{}' already exists. Overwrite?", target.display());
        if channel.ask_yes_no(&message) {
            remove_tree(target)?;
            Ok(Decision::Proceed)
        } else {
            Ok(Decision::Skip)
        }
    }

    /// Whether stdin is attached to a real terminal, for callers that need
    /// to pass `is_tty` into `decide`.
    pub fn stdin_is_tty() -> bool {
        io::stdin().is_terminal()
    }
}

/// A stage's output root counts as "already existing" only once it's been
/// written to. `SubjectWorkspace` (C1) pre-creates every stage's output
/// directory empty before any stage runs, so a bare `Path::exists` would
/// report every first run as a pre-existing target; a directory only
/// counts once it holds at least one entry. Files have no such ambiguity.
fn is_populated(target: &Path) -> bool {
    if target.is_dir() {
        std::fs::read_dir(target)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
    } else {
        target.exists()
    }
}

fn remove_tree(target: &Path) -> Result<()> {
    if target.is_dir() {
        std::fs::remove_dir_all(target)
            .with_context(|| format!("failed to remove directory tree {}", target.display()))
    } else {
        std::fs::remove_file(target)
            .with_context(|| format!("failed to remove file {}", target.display()))
    }
}
