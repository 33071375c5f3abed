//! Resource Monitor (C5, spec §4.5).

use std::path::Path;

use sysinfo::System;

use crate::logger::SubjectLogger;

/// A named snapshot of system resources, captured at "before"/"after" a
/// long-running stage. Missing counters become `None` and render as
/// `N/A`; this never fails (spec §4.5 contract).
#[derive(Debug, Clone)]
pub struct ResourceSnapshot {
    pub label: String,
    pub memory_used_kb: Option<u64>,
    pub memory_total_kb: Option<u64>,
    pub load1: Option<f64>,
    pub load5: Option<f64>,
    pub load15: Option<f64>,
    pub disk_available_bytes: Option<u64>,
}

impl ResourceSnapshot {
    fn fmt_u64(value: Option<u64>) -> String {
        value.map(|v| v.to_string()).unwrap_or_else(|| "N/A".to_string())
    }

    fn fmt_f64(value: Option<f64>) -> String {
        value
            .map(|v| format!("{v:.2}"))
            .unwrap_or_else(|| "N/A".to_string())
    }

    /// One-line INFO record summarizing the snapshot, per spec §4.5
    /// ("writes a one-line INFO record into the logger").
    pub fn summary_line(&self) -> String {
        format!(
            "resource snapshot '{}': mem={}/{} KB, load={}/{}/{}, disk_free={} bytes",
            self.label,
            Self::fmt_u64(self.memory_used_kb),
            Self::fmt_u64(self.memory_total_kb),
            Self::fmt_f64(self.load1),
            Self::fmt_f64(self.load5),
            Self::fmt_f64(self.load15),
            Self::fmt_u64(self.disk_available_bytes),
        )
    }
}

/// Captures `ResourceSnapshot`s against a fixed "derivatives root" used
/// for the disk-free-space reading.
pub struct ResourceMonitor {
    derivatives_root: std::path::PathBuf,
}

impl ResourceMonitor {
    pub fn new(derivatives_root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            derivatives_root: derivatives_root.into(),
        }
    }

    /// Take a snapshot labelled `label` (e.g. "before RECON",
    /// "after RECON"), logging it at INFO on `logger`.
    pub fn snapshot(&self, label: &str, logger: &SubjectLogger) -> ResourceSnapshot {
        let snapshot = self.snapshot_unlogged(label);
        logger.info(&snapshot.summary_line());
        snapshot
    }

    /// Take a snapshot without logging it (used in tests and for the
    /// duration/outcome bookkeeping the caller logs separately).
    pub fn snapshot_unlogged(&self, label: &str) -> ResourceSnapshot {
        let mut system = System::new();
        system.refresh_memory();

        let memory_used_kb = Some(system.used_memory());
        let memory_total_kb = Some(system.total_memory());

        let load = System::load_average();
        let (load1, load5, load15) = if load.one.is_finite() {
            (Some(load.one), Some(load.five), Some(load.fifteen))
        } else {
            (None, None, None)
        };

        let disk_available_bytes = disk_free_space(&self.derivatives_root);

        ResourceSnapshot {
            label: label.to_string(),
            memory_used_kb,
            memory_total_kb,
            load1,
            load5,
            load15,
            disk_available_bytes,
        }
    }
}

fn disk_free_space(path: &Path) -> Option<u64> {
    // fs2 requires an existing path; walk up to an existing ancestor so a
    // not-yet-created derivatives root doesn't make the whole snapshot fail.
    let mut candidate = path.to_path_buf();
    loop {
        if candidate.exists() {
            return fs2::available_space(&candidate).ok();
        }
        if !candidate.pop() {
            return None;
        }
    }
}
