use super::{hash_file, Fingerprint};
use crate::model::MediaRecord;
use crate::progress::ProgressReporter;
use rayon::prelude::*;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{error, trace};

/// Records that could not be read while hashing.
pub type Unreadable = Vec<(MediaRecord, io::Error)>;

/// Hash every record in parallel. The output keeps the input order; callers
/// must not resolve groups before this returns.
pub fn hash_records(
    records: Vec<MediaRecord>,
    reporter: &dyn ProgressReporter,
) -> (Vec<(MediaRecord, Fingerprint)>, Unreadable) {
    let total = records.len();
    let hashed = AtomicUsize::new(0);

    let results: Vec<(MediaRecord, io::Result<Fingerprint>)> = records
        .into_par_iter()
        .map(|record| {
            let result = hash_file(&record.absolute_path);
            let done = hashed.fetch_add(1, Ordering::Relaxed) + 1;
            reporter.on_hash_progress(done, total);
            (record, result)
        })
        .collect();

    let mut fingerprinted = Vec::with_capacity(results.len());
    let mut unreadable = Vec::new();
    for (record, result) in results {
        match result {
            Ok(fingerprint) => {
                trace!("{} {}", fingerprint.short(), record.absolute_path.display());
                fingerprinted.push((record, fingerprint));
            }
            Err(e) => {
                error!(
                    "Error hashing file '{}': {}",
                    record.absolute_path.display(),
                    e
                );
                unreadable.push((record, e));
            }
        }
    }

    (fingerprinted, unreadable)
}
