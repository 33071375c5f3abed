//! Structured Logger (C3, spec §4.3, §6.4).

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;

/// Log severity, ordered `Debug < Info < Warn < Error` so a threshold
/// comparison (`level >= threshold`) is a plain `>=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn label(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    fn colorize(self, text: &str) -> colored::ColoredString {
        match self {
            LogLevel::Debug => text.dimmed(),
            LogLevel::Info => text.normal(),
            LogLevel::Warn => text.yellow(),
            LogLevel::Error => text.red().bold(),
        }
    }
}

/// Display mode for child-process output, chosen from the `DEBUG`
/// environment knob (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Child output tee'd to console and log file, line by line.
    Detail,
    /// Child output goes only to the log file; console gets stage
    /// boundary events only.
    Summary,
}

/// Logger-wide configuration, derived from the `DEBUG` environment
/// variable per spec §6.2.
#[derive(Debug, Clone, Copy)]
pub struct LoggerConfig {
    pub file_threshold: LogLevel,
    pub console_threshold: LogLevel,
    pub mode: DisplayMode,
}

impl LoggerConfig {
    /// `DEBUG ∈ {"true", "1"}` → `DEBUG` level + detail mode; otherwise
    /// `INFO` level + summary mode.
    pub fn from_env() -> Self {
        let debug = std::env::var("DEBUG")
            .map(|v| matches!(v.as_str(), "true" | "1"))
            .unwrap_or(false);

        if debug {
            Self {
                file_threshold: LogLevel::Debug,
                console_threshold: LogLevel::Debug,
                mode: DisplayMode::Detail,
            }
        } else {
            Self {
                file_threshold: LogLevel::Info,
                console_threshold: LogLevel::Info,
                mode: DisplayMode::Summary,
            }
        }
    }
}

/// The console sink shared across all subjects in a run. Serializes
/// writes with a mutex so a logical line from one subject never
/// interleaves with another's (spec §4.3 concurrency guarantee).
pub struct ConsoleSink {
    lock: Mutex<()>,
    /// Whether to prefix each console line with the subject's tag; true
    /// whenever more than one subject may be writing concurrently
    /// (Parallel mode).
    pub tag_lines: bool,
}

impl ConsoleSink {
    pub fn new(tag_lines: bool) -> Arc<Self> {
        Arc::new(Self {
            lock: Mutex::new(()),
            tag_lines,
        })
    }

    fn write_line(&self, tag: &str, line: &str) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut stdout = std::io::stdout();
        if self.tag_lines {
            let _ = writeln!(stdout, "[{tag}] {line}");
        } else {
            let _ = writeln!(stdout, "{line}");
        }
    }
}

/// Per-subject log file, opened at `derivatives/ti-toolbox/logs/sub-<id>/
/// preprocessing_<UTC-timestamp>.log` and appended to line by line for the
/// remainder of the invocation.
pub struct SubjectLogger {
    subject_tag: String,
    file: Mutex<File>,
    config: LoggerConfig,
    console: Arc<ConsoleSink>,
}

impl SubjectLogger {
    /// Open a new per-subject log file under `logs_dir`, named with the
    /// current UTC timestamp (one file per invocation per subject, per
    /// spec §3 `LogFile`).
    pub fn create(
        logs_dir: &Path,
        subject_tag: &str,
        config: LoggerConfig,
        console: Arc<ConsoleSink>,
    ) -> Result<(Self, PathBuf)> {
        std::fs::create_dir_all(logs_dir)
            .with_context(|| format!("failed to create log directory {}", logs_dir.display()))?;

        let timestamp = Utc::now().format("%Y%m%dT%H%M%SZ");
        let path = logs_dir.join(format!("preprocessing_{timestamp}.log"));

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;

        Ok((
            Self {
                subject_tag: subject_tag.to_string(),
                file: Mutex::new(file),
                config,
                console,
            },
            path,
        ))
    }

    /// Log a structured line at `level`. Written to the file iff
    /// `level >= file_threshold`; written to the console iff
    /// `level >= console_threshold`.
    pub fn log(&self, level: LogLevel, message: &str) {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("[{timestamp}] [{}] {message}", level.label());

        if level >= self.config.file_threshold {
            self.write_file_line(&line);
        }

        if level >= self.config.console_threshold {
            let colored = format!("[{timestamp}] [{}] {message}", level.colorize(level.label()));
            self.console.write_line(&self.subject_tag, &colored);
        }
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }
    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }
    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }
    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    /// Stream one line of child-process output. Always appended verbatim
    /// to the log file; echoed to the console only in `Detail` mode.
    pub fn child_line(&self, raw_line: &str) {
        self.write_file_line(raw_line);

        if self.config.mode == DisplayMode::Detail {
            self.console.write_line(&self.subject_tag, raw_line);
        }
    }

    /// A stage-boundary event ("stage X starting / finished in T /
    /// FAILED"); shown on the console in both display modes.
    pub fn stage_boundary(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn write_file_line(&self, line: &str) {
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        let _ = writeln!(file, "{line}");
        let _ = file.flush();
    }
}
