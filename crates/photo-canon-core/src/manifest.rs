//! The per-run CSV handoff between planning and the store/sidecar stages.
//!
//! Layout: `<manifest_root>/<run_label>/dedup_plan__{unique,duplicates,already_present}.csv`,
//! each file with a single header row. Rows are sorted by fingerprint, then
//! account, then relative path.

use crate::error::Error;
use crate::hasher::Fingerprint;
use crate::model::{MediaRecord, Occurrence};
use crate::resolver::ResolvedGroup;
use csv::{ReaderBuilder, WriterBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const UNIQUE_FILE: &str = "dedup_plan__unique.csv";
pub const DUPLICATES_FILE: &str = "dedup_plan__duplicates.csv";
pub const ALREADY_PRESENT_FILE: &str = "dedup_plan__already_present.csv";

const UNIQUE_HEADERS: &[&str] = &[
    "fingerprint",
    "extension",
    "account",
    "relativePath",
    "absolutePath",
    "runLabel",
    "preferredAccount",
    "occurrenceCount",
];
const DUPLICATE_HEADERS: &[&str] = &[
    "fingerprint",
    "extension",
    "account",
    "relativePath",
    "absolutePath",
    "runLabel",
    "preferredAccount",
];
const ALREADY_PRESENT_HEADERS: &[&str] = &[
    "fingerprint",
    "extension",
    "account",
    "relativePath",
    "absolutePath",
    "runLabel",
];

/// The canonical occurrence of one new fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniqueRow {
    pub fingerprint: Fingerprint,
    pub extension: String,
    pub account: String,
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub run_label: String,
    pub preferred_account: String,
    pub occurrence_count: usize,
}

/// An occurrence shadowed by its group's canonical row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateRow {
    pub fingerprint: Fingerprint,
    pub extension: String,
    pub account: String,
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub run_label: String,
    pub preferred_account: String,
}

/// An occurrence whose content the store already held when the run was planned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlreadyPresentRow {
    pub fingerprint: Fingerprint,
    pub extension: String,
    pub account: String,
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub run_label: String,
}

macro_rules! impl_occurrence {
    ($($row:ty),*) => {
        $(
            impl Occurrence for $row {
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
        )*
    };
}

impl_occurrence!(UniqueRow, DuplicateRow, AlreadyPresentRow);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestPaths {
    pub dir: PathBuf,
    pub unique: PathBuf,
    pub duplicates: PathBuf,
    pub already_present: PathBuf,
}

impl ManifestPaths {
    pub fn for_run(manifest_root: &Path, run_label: &str) -> Self {
        let dir = manifest_root.join(run_label);
        Self {
            unique: dir.join(UNIQUE_FILE),
            duplicates: dir.join(DUPLICATES_FILE),
            already_present: dir.join(ALREADY_PRESENT_FILE),
            dir,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub unique: Vec<UniqueRow>,
    pub duplicates: Vec<DuplicateRow>,
    pub already_present: Vec<AlreadyPresentRow>,
}

impl Manifest {
    pub fn build(
        groups: &[ResolvedGroup],
        already_present: &[(Fingerprint, MediaRecord)],
        run_label: &str,
        preferred_account: &str,
    ) -> Self {
        let mut manifest = Manifest::default();

        for group in groups {
            let canonical = &group.canonical;
            manifest.unique.push(UniqueRow {
                fingerprint: group.fingerprint.clone(),
                extension: canonical.extension.clone(),
                account: canonical.account.clone(),
                relative_path: canonical.relative_path.clone(),
                absolute_path: canonical.absolute_path.clone(),
                run_label: run_label.to_string(),
                preferred_account: preferred_account.to_string(),
                occurrence_count: group.occurrence_count(),
            });
            for dup in &group.duplicates {
                manifest.duplicates.push(DuplicateRow {
                    fingerprint: group.fingerprint.clone(),
                    extension: dup.extension.clone(),
                    account: dup.account.clone(),
                    relative_path: dup.relative_path.clone(),
                    absolute_path: dup.absolute_path.clone(),
                    run_label: run_label.to_string(),
                    preferred_account: preferred_account.to_string(),
                });
            }
        }

        for (fingerprint, record) in already_present {
            manifest.already_present.push(AlreadyPresentRow {
                fingerprint: fingerprint.clone(),
                extension: record.extension.clone(),
                account: record.account.clone(),
                relative_path: record.relative_path.clone(),
                absolute_path: record.absolute_path.clone(),
                run_label: run_label.to_string(),
            });
        }

        manifest.sort();
        manifest
    }

    pub fn sort(&mut self) {
        fn key<R: Occurrence>(fingerprint: &Fingerprint, row: &R) -> (String, String, String) {
            (
                fingerprint.to_string(),
                row.account().to_string(),
                row.relative_path().to_string(),
            )
        }
        self.unique
            .sort_by_cached_key(|r| key(&r.fingerprint, r));
        self.duplicates
            .sort_by_cached_key(|r| key(&r.fingerprint, r));
        self.already_present
            .sort_by_cached_key(|r| key(&r.fingerprint, r));
    }

    pub fn row_count(&self) -> usize {
        self.unique.len() + self.duplicates.len() + self.already_present.len()
    }

    /// Duplicate rows keyed by fingerprint, in file order.
    pub fn duplicates_by_fingerprint(&self) -> BTreeMap<&Fingerprint, Vec<&DuplicateRow>> {
        let mut map: BTreeMap<&Fingerprint, Vec<&DuplicateRow>> = BTreeMap::new();
        for row in &self.duplicates {
            map.entry(&row.fingerprint).or_default().push(row);
        }
        map
    }

    /// Write all three files, each replaced atomically.
    pub fn write(&self, paths: &ManifestPaths) -> Result<(), Error> {
        fs::create_dir_all(&paths.dir)?;
        write_rows(&paths.unique, UNIQUE_HEADERS, &self.unique)?;
        write_rows(&paths.duplicates, DUPLICATE_HEADERS, &self.duplicates)?;
        write_rows(
            &paths.already_present,
            ALREADY_PRESENT_HEADERS,
            &self.already_present,
        )?;
        debug!(
            "Manifest written to {}: {} unique, {} duplicate, {} already present",
            paths.dir.display(),
            self.unique.len(),
            self.duplicates.len(),
            self.already_present.len()
        );
        Ok(())
    }

    /// Read a run's manifest. The unique file is required; the other two are
    /// treated as empty when absent.
    pub fn read(paths: &ManifestPaths) -> Result<Self, Error> {
        if !paths.unique.is_file() {
            return Err(Error::ManifestMissing(paths.unique.clone()));
        }

        let mut unique: Vec<UniqueRow> = read_rows(&paths.unique)?;
        for row in &mut unique {
            row.extension = normalize_extension(&row.extension);
        }
        let mut duplicates: Vec<DuplicateRow> = read_optional_rows(&paths.duplicates)?;
        for row in &mut duplicates {
            row.extension = normalize_extension(&row.extension);
        }
        let mut already_present: Vec<AlreadyPresentRow> =
            read_optional_rows(&paths.already_present)?;
        for row in &mut already_present {
            row.extension = normalize_extension(&row.extension);
        }

        Ok(Manifest {
            unique,
            duplicates,
            already_present,
        })
    }
}

/// Lowercase and ensure a single leading dot; empty stays empty.
pub fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().trim_start_matches('.').to_lowercase();
    if ext.is_empty() {
        ext
    } else {
        format!(".{}", ext)
    }
}

/// Write `rows` under a fixed header row, replacing `path` atomically.
pub(crate) fn write_rows<R: Serialize>(
    path: &Path,
    headers: &[&str],
    rows: &[R],
) -> Result<(), Error> {
    let partial = path.with_extension("csv.partial");
    {
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_path(&partial)?;
        writer.write_record(headers)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    fs::rename(&partial, path)?;
    Ok(())
}

fn read_rows<R: DeserializeOwned>(path: &Path) -> Result<Vec<R>, Error> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

fn read_optional_rows<R: DeserializeOwned>(path: &Path) -> Result<Vec<R>, Error> {
    if path.is_file() {
        read_rows(path)
    } else {
        warn!("Manifest file {} not found, treating as empty", path.display());
        Ok(Vec::new())
    }
}
