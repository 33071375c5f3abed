//! Subject identity and the `sub-*` round-trip law (spec §3, §8).

use std::path::Path;

use anyhow::{bail, Result};

/// Maximum length of a subject ID, mirroring the teacher's path-safety
/// discipline for user-supplied identifiers (`validation::MAX_ID_LENGTH`).
pub const MAX_ID_LENGTH: usize = 128;

/// Identity of one subject. Two `SubjectRef`s with the same `id` are the
/// same subject; uniqueness across a run is enforced by the caller before
/// scheduling (see `config::resolve_subjects`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubjectRef {
    id: String,
}

impl SubjectRef {
    /// Build a `SubjectRef` from a bare ID, validating it.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_subject_id(&id)?;
        Ok(Self { id })
    }

    /// Resolve a `SubjectRef` from any of the accepted input forms:
    /// `"<id>"`, `"sub-<id>"`, or a filesystem path ending in `sub-<id>`.
    ///
    /// This is the round-trip law of spec §8: for any `X` in
    /// `{"<id>", "sub-<id>", ".../sub-<id>"}`, the resolved ID is always
    /// `<id>` with no `sub-` prefix and no path components.
    pub fn resolve(input: &str) -> Result<Self> {
        let basename = Path::new(input)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(input);

        let id = basename.strip_prefix("sub-").unwrap_or(basename);
        Self::new(id)
    }

    /// The bare subject ID, with no `sub-` prefix.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The BIDS form of the subject's directory name: `sub-<id>`.
    pub fn bids_name(&self) -> String {
        format!("sub-{}", self.id)
    }
}

impl std::fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.bids_name())
    }
}

/// Validate that an ID is safe for use in file path construction and
/// non-empty. Mirrors the teacher's `validation::validate_id`, restricted
/// to the character set BIDS subject labels actually allow.
fn validate_subject_id(id: &str) -> Result<()> {
    if id.is_empty() {
        bail!("subject ID cannot be empty");
    }

    if id.len() > MAX_ID_LENGTH {
        bail!(
            "subject ID '{id}' is too long: {} characters (max {MAX_ID_LENGTH})",
            id.len()
        );
    }

    // Reject carriage returns and other line terminators outright: the
    // source system's CRLF-configured templates produced phantom "\r"
    // directories downstream of exactly this kind of unchecked string.
    if id.chars().any(|c| c == '\r' || c == '\n') {
        bail!("subject ID '{id}' contains a line-terminator character");
    }

    let valid_chars = id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid_chars {
        bail!(
            "subject ID '{id}' contains invalid characters; use only alphanumerics, '-', and '_'"
        );
    }

    if id == "." || id == ".." {
        bail!("subject ID '{id}' is not a valid identifier");
    }

    Ok(())
}
