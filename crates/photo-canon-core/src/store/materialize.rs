use super::{publish_no_clobber, Store};
use crate::hasher::{Fingerprint, READ_CHUNK_LENGTH};
use crate::manifest::UniqueRow;
use crate::progress::ProgressReporter;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaterializeSummary {
    pub copied: usize,
    pub skipped_existing: usize,
    pub missing_source: usize,
    /// Source bytes no longer hash to the manifest fingerprint.
    pub mismatched: usize,
    pub failed: usize,
    pub purged_junk: usize,
}

/// Copy each unique row's source into the store under its fingerprint name.
/// Only failure to create the store itself is fatal; per-row problems are counted.
pub fn materialize(
    store: &Store,
    rows: &[UniqueRow],
    reporter: &dyn ProgressReporter,
) -> io::Result<MaterializeSummary> {
    fs::create_dir_all(store.root())?;

    let start = Instant::now();
    let mut summary = MaterializeSummary::default();
    reporter.on_materialize_start(rows.len());

    for (i, row) in rows.iter().enumerate() {
        materialize_row(store, row, &mut summary);
        reporter.on_materialize_progress(i + 1, rows.len());
    }

    summary.purged_junk = store.purge_junk()?;
    reporter.on_materialize_complete(summary.copied, start.elapsed().as_secs_f64());

    info!(
        "Materialized {} new canonicals, {} already present, {} missing sources, {} mismatched, {} failed",
        summary.copied,
        summary.skipped_existing,
        summary.missing_source,
        summary.mismatched,
        summary.failed
    );
    Ok(summary)
}

fn materialize_row(store: &Store, row: &UniqueRow, summary: &mut MaterializeSummary) {
    let dest = store.media_path(&row.fingerprint, &row.extension);
    if dest.exists() {
        summary.skipped_existing += 1;
        return;
    }

    if !row.absolute_path.is_file() {
        warn!(
            "Missing source, skipping: {}",
            row.absolute_path.display()
        );
        summary.missing_source += 1;
        return;
    }

    let final_name = Store::media_name(&row.fingerprint, &row.extension);
    let partial = store.partial_path(&final_name);

    let copied = match copy_hashing(&row.absolute_path, &partial) {
        Ok(fingerprint) => fingerprint,
        Err(e) => {
            error!(
                "Error copying {} to {}: {}",
                row.absolute_path.display(),
                dest.display(),
                e
            );
            let _ = fs::remove_file(&partial);
            summary.failed += 1;
            return;
        }
    };

    if copied != row.fingerprint {
        warn!(
            "Source changed since planning, skipping: {} (expected {}, read {})",
            row.absolute_path.display(),
            row.fingerprint.short(),
            copied.short()
        );
        let _ = fs::remove_file(&partial);
        summary.mismatched += 1;
        return;
    }

    match publish_no_clobber(&partial, &dest) {
        Ok(true) => {
            debug!("Copied {} -> {}", row.absolute_path.display(), dest.display());
            summary.copied += 1;
        }
        Ok(false) => summary.skipped_existing += 1,
        Err(e) => {
            error!("Error publishing {}: {}", dest.display(), e);
            let _ = fs::remove_file(&partial);
            summary.failed += 1;
        }
    }
}

/// Copy `src` to a new file at `dest`, returning the fingerprint of the bytes written.
pub fn copy_hashing(src: &Path, dest: &Path) -> io::Result<Fingerprint> {
    let mut reader = File::open(src)?;
    let mut writer = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)?;

    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; READ_CHUNK_LENGTH];
    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
        writer.write_all(&buffer[..bytes_read])?;
    }
    writer.sync_all()?;
    Ok(hasher.finalize().into())
}

impl Store {
    /// Delete sync/filesystem junk that leaked into the top of the store.
    pub fn purge_junk(&self) -> io::Result<usize> {
        let mut purged = 0;
        for path in self.junk_files(usize::MAX)? {
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Purged junk {}", path.display());
                    purged += 1;
                }
                Err(e) => warn!("Could not remove junk {}: {}", path.display(), e),
            }
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::{hash_bytes, hash_file};
    use crate::progress::SilentReporter;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn row(src: PathBuf, content: &[u8]) -> UniqueRow {
        UniqueRow {
            fingerprint: hash_bytes(content),
            extension: ".jpg".to_string(),
            account: "alice".to_string(),
            relative_path: src.file_name().unwrap().to_string_lossy().into_owned(),
            absolute_path: src,
            run_label: "run".to_string(),
            preferred_account: "alice".to_string(),
            occurrence_count: 1,
        }
    }

    #[test]
    fn test_copy_round_trips_fingerprint() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("IMG_1.jpg");
        fs::write(&src, b"pixels").unwrap();
        let store = Store::new(tmp.path().join("CANON"), "photocanon");
        let rows = vec![row(src, b"pixels")];

        let summary = materialize(&store, &rows, &SilentReporter).unwrap();
        assert_eq!(summary.copied, 1);

        let dest = store.media_path(&rows[0].fingerprint, ".jpg");
        assert_eq!(hash_file(&dest).unwrap(), rows[0].fingerprint);
    }

    #[test]
    fn test_second_run_is_noop() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("IMG_1.jpg");
        fs::write(&src, b"pixels").unwrap();
        let store = Store::new(tmp.path().join("CANON"), "photocanon");
        let rows = vec![row(src, b"pixels")];

        materialize(&store, &rows, &SilentReporter).unwrap();
        let second = materialize(&store, &rows, &SilentReporter).unwrap();
        assert_eq!(second.copied, 0);
        assert_eq!(second.skipped_existing, 1);
        assert_eq!(second.failed, 0);
        assert_eq!(fs::read_dir(store.root()).unwrap().count(), 1);
    }

    #[test]
    fn test_missing_source_does_not_block_others() {
        let tmp = tempdir().unwrap();
        let present = tmp.path().join("present.jpg");
        fs::write(&present, b"here").unwrap();
        let store = Store::new(tmp.path().join("CANON"), "photocanon");
        let rows = vec![
            row(tmp.path().join("gone.jpg"), b"gone"),
            row(present, b"here"),
        ];

        let summary = materialize(&store, &rows, &SilentReporter).unwrap();
        assert_eq!(summary.missing_source, 1);
        assert_eq!(summary.copied, 1);
    }

    #[test]
    fn test_changed_source_is_not_published() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("edited.jpg");
        fs::write(&src, b"after edit").unwrap();
        let store = Store::new(tmp.path().join("CANON"), "photocanon");
        let rows = vec![row(src, b"before edit")];

        let summary = materialize(&store, &rows, &SilentReporter).unwrap();
        assert_eq!(summary.mismatched, 1);
        assert_eq!(fs::read_dir(store.root()).unwrap().count(), 0);
    }

    #[test]
    fn test_junk_is_purged() {
        let tmp = tempdir().unwrap();
        let store = Store::new(tmp.path().join("CANON"), "photocanon");
        fs::create_dir_all(store.root()).unwrap();
        fs::write(store.root().join("._abc.jpg"), b"").unwrap();
        fs::write(store.root().join(".DS_Store"), b"").unwrap();

        let summary = materialize(&store, &[], &SilentReporter).unwrap();
        assert_eq!(summary.purged_junk, 2);
        assert_eq!(fs::read_dir(store.root()).unwrap().count(), 0);
    }
}
