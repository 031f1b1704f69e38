use crate::error::Error;
use crate::filters::{dotted_extension, FileFilter};
use crate::model::MediaRecord;
use crate::progress::ProgressReporter;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};
use walkdir::WalkDir;

/// Everything a scan found.
#[derive(Debug, Default)]
pub struct ScanOutput {
    pub records: Vec<MediaRecord>,
    /// Media files left out because their paths are not valid UTF-8 and
    /// cannot be written to the manifest.
    pub non_utf8: Vec<PathBuf>,
}

/// Walk every account root in order and collect the media records that pass
/// the filter. Roots are visited sorted by file name so discovery order is stable.
pub fn scan_accounts(
    roots: &[(String, PathBuf)],
    filter: &FileFilter,
    reporter: &dyn ProgressReporter,
) -> Result<ScanOutput, Error> {
    let mut output = ScanOutput::default();
    for (account, root) in roots {
        let before = output.records.len();
        scan_account(account, root, filter, reporter, &mut output)?;
        debug!(
            "Account '{}': {} media files under {}",
            account,
            output.records.len() - before,
            root.display()
        );
    }
    Ok(output)
}

pub fn scan_account(
    account: &str,
    root: &Path,
    filter: &FileFilter,
    reporter: &dyn ProgressReporter,
    output: &mut ScanOutput,
) -> Result<(), Error> {
    if !root.is_dir() {
        return Err(Error::MissingSourceRoot {
            account: account.to_string(),
            path: root.to_path_buf(),
        });
    }

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !filter.is_ignored_path(entry.path()));

    for entry_result in walker {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) => {
                let path = err
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                if err.io_error().map(|e| e.kind()) == Some(io::ErrorKind::PermissionDenied) {
                    error!("Access denied reading {}: {}", path, err);
                    continue;
                }
                let err = io::Error::from(err);
                return Err(Error::Io(io::Error::new(
                    err.kind(),
                    format!("Error walking {}: {}", path, err),
                )));
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if path.to_str().is_none() {
            if filter.is_media(path) {
                warn!(
                    "Skipping media file with a non-UTF-8 path: {}",
                    path.display()
                );
                output.non_utf8.push(path.to_path_buf());
            }
            continue;
        }

        if !filter.accepts(path) {
            continue;
        }

        let extension = match dotted_extension(path) {
            Some(ext) => ext,
            None => continue,
        };
        let relative_path = match path.strip_prefix(root) {
            Ok(rel) => slash_path(rel),
            Err(_) => continue,
        };

        output.records.push(MediaRecord {
            account: account.to_string(),
            source_root: root.to_path_buf(),
            relative_path,
            absolute_path: path.to_path_buf(),
            extension,
        });
        reporter.on_scan_progress(output.records.len(), &path.to_string_lossy());
    }

    Ok(())
}

/// Join path components with `/` regardless of platform.
pub fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
