use std::path::{Path, PathBuf};

/// A media file found under one account's source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRecord {
    pub account: String,
    pub source_root: PathBuf,
    /// Path below `source_root`, `/`-separated.
    pub relative_path: String,
    pub absolute_path: PathBuf,
    /// Lowercased, with leading dot.
    pub extension: String,
}

/// Anything that names one on-disk occurrence of some content. Implemented by
/// scanned records and by manifest rows so the same canonical ordering applies
/// before and after the manifest handoff.
pub trait Occurrence {
    fn account(&self) -> &str;
    fn relative_path(&self) -> &str;
    fn absolute_path(&self) -> &Path;
}

impl Occurrence for MediaRecord {
    fn account(&self) -> &str {
        &self.account
    }

    fn relative_path(&self) -> &str {
        &self.relative_path
    }

    fn absolute_path(&self) -> &Path {
        &self.absolute_path
    }
}

/// `2024-01-31T09:15:00Z`: UTC with second precision.
pub fn format_utc_seconds(at: &chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
