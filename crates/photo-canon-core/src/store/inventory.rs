//! Read-only reports over an existing store: the by-hash inventory, junk
//! detection and content verification.

use super::Store;
use crate::error::Error;
use crate::filters::{is_ignorable, is_partial};
use crate::hasher::{hash_file, Fingerprint};
use crate::manifest::write_rows;
use crate::model::format_utc_seconds;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{error, info, warn};
use walkdir::WalkDir;

pub const INVENTORY_FILE: &str = "canonical_inventory__by-hash.csv";

const INVENTORY_HEADERS: &[&str] = &[
    "generatedAtUtc",
    "fingerprint",
    "extension",
    "bytes",
    "mtimeEpochSec",
    "fileName",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRow {
    pub generated_at_utc: String,
    pub fingerprint: Fingerprint,
    pub extension: String,
    pub bytes: u64,
    pub mtime_epoch_sec: i64,
    pub file_name: String,
}

/// Stray files that should not be in a store.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StoreHealth {
    pub junk: Vec<PathBuf>,
    pub partials: Vec<PathBuf>,
}

impl StoreHealth {
    pub fn is_clean(&self) -> bool {
        self.junk.is_empty() && self.partials.is_empty()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub checked: usize,
    /// Entries whose bytes no longer hash to their name.
    pub mismatched: Vec<PathBuf>,
    pub unreadable: Vec<PathBuf>,
    pub missing_sidecar: Vec<PathBuf>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.mismatched.is_empty() && self.unreadable.is_empty()
    }
}

impl Store {
    /// Junk-named files anywhere under the store, at most `limit` of them.
    pub fn junk_files(&self, limit: usize) -> io::Result<Vec<PathBuf>> {
        self.matching_files(limit, is_ignorable)
    }

    /// Leftover partial copies from interrupted runs, at most `limit` of them.
    pub fn partial_files(&self, limit: usize) -> io::Result<Vec<PathBuf>> {
        self.matching_files(limit, is_partial)
    }

    pub fn health(&self, limit: usize) -> io::Result<StoreHealth> {
        Ok(StoreHealth {
            junk: self.junk_files(limit)?,
            partials: self.partial_files(limit)?,
        })
    }

    fn matching_files(&self, limit: usize, predicate: fn(&str) -> bool) -> io::Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        if !self.root().is_dir() {
            return Ok(found);
        }
        for entry in WalkDir::new(self.root()).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.file_name().to_str().is_some_and(predicate) {
                found.push(entry.into_path());
                if found.len() >= limit {
                    break;
                }
            }
        }
        Ok(found)
    }

    /// One row per media entry, sorted by fingerprint.
    pub fn inventory(&self, generated_at: &DateTime<Utc>) -> io::Result<Vec<InventoryRow>> {
        let generated_at_utc = format_utc_seconds(generated_at);
        let mut rows = Vec::new();
        for entry in self.entries()? {
            let metadata = std::fs::metadata(&entry.path)?;
            let mtime_epoch_sec = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            rows.push(InventoryRow {
                generated_at_utc: generated_at_utc.clone(),
                fingerprint: entry.fingerprint,
                extension: entry.extension.to_lowercase(),
                bytes: metadata.len(),
                mtime_epoch_sec,
                file_name: entry
                    .path
                    .file_name()
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            });
        }
        rows.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        Ok(rows)
    }

    /// Re-hash every media entry and compare against its name.
    pub fn verify(&self) -> io::Result<VerifyReport> {
        let entries = self.entries()?;
        let results: Vec<(PathBuf, io::Result<bool>, bool)> = entries
            .par_iter()
            .map(|entry| {
                let matches = hash_file(&entry.path).map(|fp| fp == entry.fingerprint);
                let has_sidecar = self
                    .sidecar_path(&entry.fingerprint, &entry.extension)
                    .is_file();
                (entry.path.clone(), matches, has_sidecar)
            })
            .collect();

        let mut report = VerifyReport {
            checked: results.len(),
            ..Default::default()
        };
        for (path, matches, has_sidecar) in results {
            match matches {
                Ok(true) => {}
                Ok(false) => {
                    warn!("Content does not match name: {}", path.display());
                    report.mismatched.push(path.clone());
                }
                Err(e) => {
                    error!("Error reading {}: {}", path.display(), e);
                    report.unreadable.push(path.clone());
                }
            }
            if !has_sidecar {
                report.missing_sidecar.push(path);
            }
        }

        info!(
            "Verified {} store entries: {} mismatched, {} unreadable, {} without sidecar",
            report.checked,
            report.mismatched.len(),
            report.unreadable.len(),
            report.missing_sidecar.len()
        );
        Ok(report)
    }
}

pub fn write_inventory(path: &Path, rows: &[InventoryRow]) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_rows(path, INVENTORY_HEADERS, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::hash_bytes;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::tempdir;

    fn populated_store(root: &Path) -> (Store, Fingerprint, Fingerprint) {
        let store = Store::new(root, "photocanon");
        fs::create_dir_all(root).unwrap();
        let a = hash_bytes(b"alpha");
        let b = hash_bytes(b"beta!");
        fs::write(store.media_path(&a, ".jpg"), b"alpha").unwrap();
        fs::write(store.sidecar_path(&a, ".jpg"), b"{}").unwrap();
        fs::write(store.media_path(&b, ".mov"), b"beta!").unwrap();
        (store, a, b)
    }

    #[test]
    fn test_inventory_lists_media_only() {
        let tmp = tempdir().unwrap();
        let (store, a, b) = populated_store(tmp.path());
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let rows = store.inventory(&at).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.generated_at_utc == "2024-05-01T12:00:00Z"));
        assert!(rows.iter().any(|r| r.fingerprint == a && r.extension == ".jpg"));
        assert!(rows.iter().any(|r| r.fingerprint == b && r.bytes == 5));

        let out = tmp.path().join("MANIFESTS").join(INVENTORY_FILE);
        write_inventory(&out, &rows).unwrap();
        let text = fs::read_to_string(&out).unwrap();
        assert!(text.starts_with("generatedAtUtc,fingerprint,extension,bytes,mtimeEpochSec,fileName\n"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_health_finds_junk_and_partials() {
        let tmp = tempdir().unwrap();
        let (store, _, _) = populated_store(tmp.path());
        assert!(store.health(10).unwrap().is_clean());

        fs::write(tmp.path().join("._x.jpg"), b"").unwrap();
        fs::write(tmp.path().join(".partial-42-abc.jpg"), b"").unwrap();
        let health = store.health(10).unwrap();
        assert_eq!(health.junk.len(), 1);
        assert_eq!(health.partials.len(), 1);
    }

    #[test]
    fn test_verify_detects_tampered_entry() {
        let tmp = tempdir().unwrap();
        let (store, _, b) = populated_store(tmp.path());

        let report = store.verify().unwrap();
        assert!(report.is_ok());
        assert_eq!(report.checked, 2);
        assert_eq!(report.missing_sidecar.len(), 1);

        fs::write(store.media_path(&b, ".mov"), b"tampered").unwrap();
        let report = store.verify().unwrap();
        assert_eq!(report.mismatched, vec![store.media_path(&b, ".mov")]);
    }
}
