use super::candidate::{CaptureTime, GeoData, MetadataCandidate};
use super::locate::{locate, Lookup};
use super::sidecar::{
    OriginalLocation, Provenance, SidecarRecord, SidecarSource, SIDECAR_VERSION, SOURCE_SYSTEM,
};
use crate::manifest::{Manifest, UniqueRow};
use crate::model::{format_utc_seconds, Occurrence};
use crate::progress::ProgressReporter;
use crate::resolver::CanonicalOrder;
use crate::scanner::slash_path;
use crate::store::Store;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Everything a sidecar needs besides the manifest.
#[derive(Debug, Clone)]
pub struct SidecarContext<'a> {
    pub store: &'a Store,
    /// Breadcrumb paths are written relative to this directory.
    pub archive_root: &'a Path,
    pub takeout_batch_id: &'a str,
    pub ingest_tool: &'a str,
    pub imported_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SidecarSummary {
    pub written: usize,
    pub skipped_missing_media: usize,
    /// Written with provenance only.
    pub no_metadata: usize,
    pub unparsable: usize,
    pub ambiguous: usize,
    /// Occurrences whose directory could not be searched for metadata.
    pub lookup_failed: usize,
    pub failed: usize,
}

/// Candidates folded in occurrence order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MergedMetadata {
    pub photo_ids: BTreeSet<String>,
    pub people: BTreeSet<String>,
    pub geo: Option<GeoData>,
    pub taken_at: Option<CaptureTime>,
    pub candidates: usize,
}

impl MergedMetadata {
    /// Identifiers and people accumulate; geo and capture time keep the first
    /// value seen.
    pub fn absorb(&mut self, candidate: MetadataCandidate) {
        self.candidates += 1;
        self.photo_ids.extend(candidate.photo_ids);
        self.people.extend(candidate.people);
        if self.geo.is_none() {
            self.geo = candidate.geo;
        }
        if self.taken_at.is_none() {
            self.taken_at = candidate.taken_at;
        }
    }
}

/// Write one sidecar per unique row whose media is in the store, merging the
/// metadata of every occurrence of its fingerprint.
pub fn write_sidecars(
    manifest: &Manifest,
    ctx: &SidecarContext,
    reporter: &dyn ProgressReporter,
) -> SidecarSummary {
    let start = Instant::now();
    let mut summary = SidecarSummary::default();
    let duplicates = manifest.duplicates_by_fingerprint();
    let total = manifest.unique.len();
    reporter.on_sidecar_start(total);

    for (i, unique) in manifest.unique.iter().enumerate() {
        let media = ctx.store.media_path(&unique.fingerprint, &unique.extension);
        if !media.is_file() {
            warn!(
                "Canonical media missing from store, no sidecar written: {}",
                media.display()
            );
            summary.skipped_missing_media += 1;
            reporter.on_sidecar_progress(i + 1, total);
            continue;
        }

        let mut others: Vec<&dyn Occurrence> = duplicates
            .get(&unique.fingerprint)
            .map(|rows| rows.iter().map(|r| *r as &dyn Occurrence).collect())
            .unwrap_or_default();
        let order = CanonicalOrder::new(&unique.preferred_account);
        others.sort_by(|a, b| order.compare(*a, *b));

        let mut occurrences: Vec<&Path> = vec![unique.absolute_path.as_path()];
        occurrences.extend(others.iter().map(|o| o.absolute_path()));

        let (merged, canonical_metadata) =
            merge_occurrences(&occurrences, ctx.store.sidecar_ending(), &mut summary);
        if merged.candidates == 0 {
            debug!("No metadata found for {}", unique.absolute_path.display());
            summary.no_metadata += 1;
        }

        let record = build_record(unique, merged, canonical_metadata.as_deref(), ctx);
        let dest = ctx.store.sidecar_path(&unique.fingerprint, &unique.extension);
        let final_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match record.write(&dest, &ctx.store.partial_path(&final_name)) {
            Ok(()) => summary.written += 1,
            Err(e) => {
                error!("Error writing sidecar {}: {}", dest.display(), e);
                summary.failed += 1;
            }
        }
        reporter.on_sidecar_progress(i + 1, total);
    }

    reporter.on_sidecar_complete(summary.written, start.elapsed().as_secs_f64());
    info!(
        "Wrote {} sidecars ({} provenance only), {} skipped for missing media, {} unparsable candidates, {} ambiguous, {} failed lookups, {} failed",
        summary.written,
        summary.no_metadata,
        summary.skipped_missing_media,
        summary.unparsable,
        summary.ambiguous,
        summary.lookup_failed,
        summary.failed
    );
    summary
}

/// Fold the candidates of `occurrences` in order. Also returns the path of the
/// canonical occurrence's own candidate, parsable or not.
fn merge_occurrences(
    occurrences: &[&Path],
    sidecar_ending: &str,
    summary: &mut SidecarSummary,
) -> (MergedMetadata, Option<PathBuf>) {
    let mut merged = MergedMetadata::default();
    let mut canonical_metadata = None;

    for (i, occurrence) in occurrences.iter().enumerate() {
        let lookup = match locate(occurrence, sidecar_ending) {
            Ok(lookup) => lookup,
            Err(e) => {
                warn!("Error looking up metadata for {}: {}", occurrence.display(), e);
                summary.lookup_failed += 1;
                continue;
            }
        };
        if matches!(lookup, Lookup::Ambiguous(_)) {
            summary.ambiguous += 1;
        }
        let path = match lookup.path() {
            Some(path) => path.to_path_buf(),
            None => continue,
        };
        if i == 0 {
            canonical_metadata = Some(path.clone());
        }

        match MetadataCandidate::load(&path) {
            Ok(candidate) => merged.absorb(candidate),
            Err(e) => {
                warn!("Unparsable metadata {}: {}", path.display(), e);
                summary.unparsable += 1;
            }
        }
    }

    (merged, canonical_metadata)
}

fn build_record(
    unique: &UniqueRow,
    merged: MergedMetadata,
    canonical_metadata: Option<&Path>,
    ctx: &SidecarContext,
) -> SidecarRecord {
    let google_photo_ids: Vec<String> = merged.photo_ids.into_iter().collect();
    let google_photo_id = google_photo_ids.first().cloned().unwrap_or_default();

    SidecarRecord {
        version: SIDECAR_VERSION,
        source: SidecarSource {
            system: SOURCE_SYSTEM.to_string(),
            google_photo_ids,
            google_photo_id,
        },
        provenance: Provenance {
            takeout_batch_id: ctx.takeout_batch_id.to_string(),
            imported_at: format_utc_seconds(&ctx.imported_at),
            ingest_tool: ctx.ingest_tool.to_string(),
        },
        original: OriginalLocation {
            filename: unique
                .absolute_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            takeout_path: archive_relative(&unique.absolute_path, ctx.archive_root),
            metadata_path: canonical_metadata
                .map(|p| archive_relative(p, ctx.archive_root))
                .unwrap_or_default(),
        },
        people: merged.people.into_iter().collect(),
        geo_data: merged.geo,
        taken_at_iso: merged.taken_at.map(|t| format_utc_seconds(&t.at)),
        taken_at_source: merged.taken_at.map(|t| t.source.key().to_string()),
    }
}

/// `/`-separated path below `archive_root`, or the path unchanged when it lies
/// outside.
fn archive_relative(path: &Path, archive_root: &Path) -> String {
    match path.strip_prefix(archive_root) {
        Ok(relative) => slash_path(relative),
        Err(_) => path.to_string_lossy().into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::{hash_bytes, Fingerprint};
    use crate::manifest::DuplicateRow;
    use crate::metadata::candidate::TakenAtSource;
    use crate::progress::SilentReporter;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::tempdir;

    fn candidate(people: &[&str], geo_lat: Option<f64>, taken: Option<i64>) -> MetadataCandidate {
        MetadataCandidate {
            people: people.iter().map(|p| p.to_string()).collect(),
            geo: geo_lat.map(|lat| GeoData {
                latitude: Some(lat),
                longitude: Some(0.0),
                altitude: None,
                latitude_span: None,
                longitude_span: None,
            }),
            taken_at: taken.map(|s| CaptureTime {
                at: Utc.timestamp_opt(s, 0).unwrap(),
                source: TakenAtSource::PhotoTakenTime,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_absorb_unions_and_keeps_first() {
        let mut merged = MergedMetadata::default();
        merged.absorb(candidate(&["Alice"], None, None));
        merged.absorb(candidate(&["Bob", "Alice"], Some(10.0), Some(100)));
        merged.absorb(candidate(&["Carol"], Some(20.0), Some(200)));

        assert_eq!(
            merged.people.iter().collect::<Vec<_>>(),
            vec!["Alice", "Bob", "Carol"]
        );
        assert_eq!(merged.geo.unwrap().latitude, Some(10.0));
        assert_eq!(merged.taken_at.unwrap().at.timestamp(), 100);
        assert_eq!(merged.candidates, 3);
    }

    #[test]
    fn test_zero_coordinates_count_as_present() {
        let mut merged = MergedMetadata::default();
        merged.absorb(candidate(&[], Some(0.0), None));
        merged.absorb(candidate(&[], Some(5.0), None));
        assert_eq!(merged.geo.unwrap().latitude, Some(0.0));
    }

    #[test]
    fn test_archive_relative() {
        let root = Path::new("/archive");
        assert_eq!(
            archive_relative(Path::new("/archive/GOOGLE_TAKEOUT/a/IMG.jpg"), root),
            "GOOGLE_TAKEOUT/a/IMG.jpg"
        );
        assert_eq!(
            archive_relative(Path::new("/elsewhere/IMG.jpg"), root),
            "/elsewhere/IMG.jpg"
        );
    }

    fn unique_row(fp: &Fingerprint, src: &Path) -> UniqueRow {
        UniqueRow {
            fingerprint: fp.clone(),
            extension: ".jpg".to_string(),
            account: "alice".to_string(),
            relative_path: "IMG_1.jpg".to_string(),
            absolute_path: src.to_path_buf(),
            run_label: "run".to_string(),
            preferred_account: "alice".to_string(),
            occurrence_count: 1,
        }
    }

    #[test]
    fn test_provenance_only_and_missing_media() {
        let tmp = tempdir().unwrap();
        let src_dir = tmp.path().join("GOOGLE_TAKEOUT/alice/unzipped");
        fs::create_dir_all(&src_dir).unwrap();
        let src = src_dir.join("IMG_1.jpg");
        fs::write(&src, b"one").unwrap();
        let present = hash_bytes(b"one");
        let absent = hash_bytes(b"two");

        let store = Store::new(tmp.path().join("CANON"), "photocanon");
        fs::create_dir_all(store.root()).unwrap();
        fs::write(store.media_path(&present, ".jpg"), b"one").unwrap();

        let manifest = Manifest {
            unique: vec![unique_row(&present, &src), unique_row(&absent, &src)],
            ..Default::default()
        };
        let ctx = SidecarContext {
            store: &store,
            archive_root: tmp.path(),
            takeout_batch_id: "batch-7",
            ingest_tool: "photo-canon",
            imported_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        };

        let summary = write_sidecars(&manifest, &ctx, &SilentReporter);
        assert_eq!(summary.written, 1);
        assert_eq!(summary.no_metadata, 1);
        assert_eq!(summary.skipped_missing_media, 1);
        assert!(!store.sidecar_path(&absent, ".jpg").exists());

        let record = SidecarRecord::load(&store.sidecar_path(&present, ".jpg")).unwrap();
        assert_eq!(record.provenance.takeout_batch_id, "batch-7");
        assert_eq!(record.provenance.imported_at, "2024-05-01T12:00:00Z");
        assert_eq!(record.original.filename, "IMG_1.jpg");
        assert_eq!(record.original.takeout_path, "GOOGLE_TAKEOUT/alice/unzipped/IMG_1.jpg");
        assert_eq!(record.original.metadata_path, "");
        assert!(record.people.is_empty());
        assert!(record.geo_data.is_none());
        assert!(record.taken_at_iso.is_none());
    }

    fn duplicate_row(fp: &Fingerprint, account: &str, src: &Path) -> DuplicateRow {
        DuplicateRow {
            fingerprint: fp.clone(),
            extension: ".jpg".to_string(),
            account: account.to_string(),
            relative_path: "IMG_1.jpg".to_string(),
            absolute_path: src.to_path_buf(),
            run_label: "run".to_string(),
            preferred_account: "bob".to_string(),
        }
    }

    fn context<'a>(store: &'a Store, archive_root: &'a Path) -> SidecarContext<'a> {
        SidecarContext {
            store,
            archive_root,
            takeout_batch_id: "batch-7",
            ingest_tool: "photo-canon",
            imported_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    /// Canonical copy under bob, one duplicate under alice, both with media
    /// on disk and the store holding the canonical.
    fn two_account_layout(root: &Path) -> (Store, Manifest, PathBuf, PathBuf) {
        let bob = root.join("bob");
        let alice = root.join("alice");
        fs::create_dir_all(&bob).unwrap();
        fs::create_dir_all(&alice).unwrap();
        fs::write(bob.join("IMG_1.jpg"), b"shared").unwrap();
        fs::write(alice.join("IMG_1.jpg"), b"shared").unwrap();
        let fp = hash_bytes(b"shared");

        let store = Store::new(root.join("CANON"), "photocanon");
        fs::create_dir_all(store.root()).unwrap();
        fs::write(store.media_path(&fp, ".jpg"), b"shared").unwrap();

        let mut canonical = unique_row(&fp, &bob.join("IMG_1.jpg"));
        canonical.account = "bob".to_string();
        canonical.preferred_account = "bob".to_string();
        canonical.occurrence_count = 2;
        let manifest = Manifest {
            unique: vec![canonical],
            duplicates: vec![duplicate_row(&fp, "alice", &alice.join("IMG_1.jpg"))],
            ..Default::default()
        };
        (store, manifest, bob, alice)
    }

    #[test]
    fn test_unparsable_canonical_metadata_falls_through_to_duplicate() {
        let tmp = tempdir().unwrap();
        let (store, manifest, bob, alice) = two_account_layout(tmp.path());
        fs::write(bob.join("IMG_1.jpg.json"), b"{broken").unwrap();
        fs::write(
            alice.join("IMG_1.jpg.json"),
            br#"{"people": [{"name": "Zed"}], "geoData": {"latitude": 3.0, "longitude": 4.0}}"#,
        )
        .unwrap();

        let summary = write_sidecars(&manifest, &context(&store, tmp.path()), &SilentReporter);
        assert_eq!(summary.unparsable, 1);
        assert_eq!(summary.written, 1);
        assert_eq!(summary.no_metadata, 0);
        assert_eq!(summary.failed, 0);

        let fp = &manifest.unique[0].fingerprint;
        let record = SidecarRecord::load(&store.sidecar_path(fp, ".jpg")).unwrap();
        assert_eq!(record.people, vec!["Zed".to_string()]);
        assert_eq!(record.geo_data.unwrap().latitude, Some(3.0));
        // The canonical's own JSON is still recorded even though it did not parse.
        assert_eq!(record.original.metadata_path, "bob/IMG_1.jpg.json");
    }

    #[test]
    fn test_ambiguous_lookup_is_counted_and_used() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path().join("carol");
        fs::create_dir_all(&dir).unwrap();
        let long = "Screenshot_2019-07-04-18-22-31-123_com.example.app.png";
        let src = dir.join(long);
        fs::write(&src, b"long").unwrap();
        // Both truncated names prefix the media name; neither title matches.
        fs::write(
            dir.join(format!("{}.json", &long[..46])),
            br#"{"title": "other.png", "people": [{"name": "Second"}]}"#,
        )
        .unwrap();
        fs::write(
            dir.join(format!("{}.json", &long[..48])),
            br#"{"title": "another.png", "people": [{"name": "First"}]}"#,
        )
        .unwrap();

        let fp = hash_bytes(b"long");
        let store = Store::new(tmp.path().join("CANON"), "photocanon");
        fs::create_dir_all(store.root()).unwrap();
        fs::write(store.media_path(&fp, ".png"), b"long").unwrap();
        let mut row = unique_row(&fp, &src);
        row.extension = ".png".to_string();
        let manifest = Manifest {
            unique: vec![row],
            ..Default::default()
        };

        let summary = write_sidecars(&manifest, &context(&store, tmp.path()), &SilentReporter);
        assert_eq!(summary.ambiguous, 1);
        assert_eq!(summary.written, 1);

        // "...example.a.json" sorts first and is the one used.
        let record = SidecarRecord::load(&store.sidecar_path(&fp, ".png")).unwrap();
        assert_eq!(record.people, vec!["First".to_string()]);
    }

    #[test]
    fn test_failed_lookup_is_counted_and_does_not_abort() {
        let tmp = tempdir().unwrap();
        let (store, mut manifest, bob, _) = two_account_layout(tmp.path());
        fs::write(bob.join("IMG_1.jpg.json"), br#"{"people": [{"name": "Bob"}]}"#).unwrap();

        // A duplicate whose parent is a regular file cannot be searched.
        let not_a_dir = tmp.path().join("not-a-dir");
        fs::write(&not_a_dir, b"").unwrap();
        manifest.duplicates[0].absolute_path = not_a_dir.join("IMG_1.jpg");

        let summary = write_sidecars(&manifest, &context(&store, tmp.path()), &SilentReporter);
        assert_eq!(summary.lookup_failed, 1);
        assert_eq!(summary.written, 1);

        let fp = &manifest.unique[0].fingerprint;
        let record = SidecarRecord::load(&store.sidecar_path(fp, ".jpg")).unwrap();
        assert_eq!(record.people, vec!["Bob".to_string()]);
    }
}
