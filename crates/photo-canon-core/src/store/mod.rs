//! The content-addressed store: one flat directory holding `<fingerprint><ext>`
//! media entries and their `<fingerprint><ext>.<suffix>.json` sidecars.

pub mod inventory;
pub mod materialize;

use crate::filters::{is_ignorable, is_partial, PARTIAL_PREFIX};
use crate::hasher::{Fingerprint, FINGERPRINT_HEX_LENGTH};
use crate::model::MediaRecord;
use crate::resolver::ResolvedGroup;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

pub use materialize::{materialize, MaterializeSummary};

#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
    sidecar_ending: String,
}

/// A media file present in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    pub fingerprint: Fingerprint,
    pub extension: String,
    pub path: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>, sidecar_suffix: &str) -> Self {
        Self {
            root: root.into(),
            sidecar_ending: format!(".{}.json", sidecar_suffix),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `.<suffix>.json`, the ending shared by every sidecar name.
    pub fn sidecar_ending(&self) -> &str {
        &self.sidecar_ending
    }

    pub fn media_name(fingerprint: &Fingerprint, extension: &str) -> String {
        format!("{}{}", fingerprint, extension)
    }

    pub fn media_path(&self, fingerprint: &Fingerprint, extension: &str) -> PathBuf {
        self.root.join(Self::media_name(fingerprint, extension))
    }

    pub fn sidecar_path(&self, fingerprint: &Fingerprint, extension: &str) -> PathBuf {
        self.root.join(format!(
            "{}{}",
            Self::media_name(fingerprint, extension),
            self.sidecar_ending
        ))
    }

    /// Temporary location for a file that will be published as `final_name`.
    /// The leading dot keeps it out of the store index.
    pub fn partial_path(&self, final_name: &str) -> PathBuf {
        self.root.join(format!(
            "{}{}-{}",
            PARTIAL_PREFIX,
            std::process::id(),
            final_name
        ))
    }

    /// Split a store file name into fingerprint and extension. Sidecars, junk
    /// and partial files yield `None`.
    pub fn parse_media_name(&self, name: &str) -> Option<(Fingerprint, String)> {
        if is_ignorable(name) || is_partial(name) || name.ends_with(&self.sidecar_ending) {
            return None;
        }
        let hex = name.get(..FINGERPRINT_HEX_LENGTH)?;
        let extension = &name[FINGERPRINT_HEX_LENGTH..];
        if !extension.is_empty() && !extension.starts_with('.') {
            return None;
        }
        let fingerprint = Fingerprint::parse(hex)?;
        Some((fingerprint, extension.to_string()))
    }

    /// Media entries sorted by name. A store directory that does not exist yet
    /// is empty.
    pub fn entries(&self) -> io::Result<Vec<StoreEntry>> {
        let read_dir = match fs::read_dir(&self.root) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(io::Error::new(
                    e.kind(),
                    format!("Error reading store {}: {}", self.root.display(), e),
                ))
            }
        };

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let name = match name.to_str() {
                Some(name) => name,
                None => continue,
            };
            if let Some((fingerprint, extension)) = self.parse_media_name(name) {
                entries.push(StoreEntry {
                    fingerprint,
                    extension,
                    path: entry.path(),
                });
            }
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    pub fn index(&self) -> io::Result<StoreIndex> {
        let fingerprints: BTreeSet<Fingerprint> =
            self.entries()?.into_iter().map(|e| e.fingerprint).collect();
        debug!(
            "Store {} holds {} fingerprints",
            self.root.display(),
            fingerprints.len()
        );
        Ok(StoreIndex { fingerprints })
    }
}

/// Fingerprints already materialized in a store.
#[derive(Debug, Clone, Default)]
pub struct StoreIndex {
    fingerprints: BTreeSet<Fingerprint>,
}

/// Result of splitting resolved groups against a store.
#[derive(Debug, Default)]
pub struct Partition {
    pub new_groups: Vec<ResolvedGroup>,
    /// Every occurrence of content the store already holds, for audit.
    pub already_present: Vec<(Fingerprint, MediaRecord)>,
}

impl StoreIndex {
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.fingerprints.contains(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }

    pub fn partition(&self, groups: Vec<ResolvedGroup>) -> Partition {
        let mut partition = Partition::default();
        for group in groups {
            if self.contains(&group.fingerprint) {
                let fingerprint = group.fingerprint.clone();
                partition.already_present.extend(
                    group
                        .into_records()
                        .map(|record| (fingerprint.clone(), record)),
                );
            } else {
                partition.new_groups.push(group);
            }
        }
        partition
    }
}

impl FromIterator<Fingerprint> for StoreIndex {
    fn from_iter<I: IntoIterator<Item = Fingerprint>>(iter: I) -> Self {
        Self {
            fingerprints: iter.into_iter().collect(),
        }
    }
}

/// Move `partial` to `dest` unless `dest` already exists. Returns `false` when
/// another writer got there first; `partial` is removed either way.
pub fn publish_no_clobber(partial: &Path, dest: &Path) -> io::Result<bool> {
    let published = match fs::hard_link(partial, dest) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => false,
        Err(e) => {
            // Some filesystems (exFAT, SMB shares) refuse hard links.
            debug!("Hard link to {} failed ({}), renaming", dest.display(), e);
            if dest.exists() {
                false
            } else {
                fs::rename(partial, dest)?;
                return Ok(true);
            }
        }
    };
    fs::remove_file(partial)?;
    Ok(published)
}

/// Replace `dest` with `partial`.
pub fn publish_overwrite(partial: &Path, dest: &Path) -> io::Result<()> {
    fs::rename(partial, dest)
}
