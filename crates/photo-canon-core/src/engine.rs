use crate::config::AppConfig;
use crate::error::Error;
use crate::filters::FileFilter;
use crate::hasher;
use crate::manifest::{Manifest, ManifestPaths};
use crate::metadata::{self, SidecarContext, SidecarSummary};
use crate::progress::ProgressReporter;
use crate::resolver::{self, CanonicalOrder};
use crate::scanner;
use crate::store::inventory::{write_inventory, StoreHealth, VerifyReport, INVENTORY_FILE};
use crate::store::{self, MaterializeSummary, Store};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// At most this many offending paths are listed by a store health check.
pub const HEALTH_LISTING_LIMIT: usize = 10;

/// Runs the stages of one configured archive. Every stage after `plan` reads
/// the manifest from disk, so stages can run in separate processes.
pub struct Pipeline {
    config: AppConfig,
    filter: FileFilter,
    store: Store,
}

#[derive(Debug)]
pub struct PlanResult {
    pub scan_duration: Duration,
    pub hash_duration: Duration,
    pub manifest_dir: PathBuf,
    pub files_scanned: usize,
    pub unreadable: usize,
    /// Media files left out of the plan because their paths are not UTF-8.
    pub skipped_non_utf8: usize,
    pub unique: usize,
    pub duplicates: usize,
    pub already_present: usize,
}

#[derive(Debug)]
pub struct InventoryResult {
    pub path: PathBuf,
    pub entries: usize,
    pub total_bytes: u64,
}

impl Pipeline {
    /// Validate `config` and prepare the filter and store it describes.
    pub fn new(config: AppConfig) -> Result<Self, Error> {
        config.validate()?;
        let filter = FileFilter::from_config(&config)?;
        let store = Store::new(config.store_dir(), &config.sidecar_suffix);
        Ok(Self {
            config,
            filter,
            store,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn manifest_paths(&self) -> ManifestPaths {
        ManifestPaths::for_run(&self.config.manifest_root(), &self.config.run_label)
    }

    /// Scan, hash, resolve and filter against the store, then write the run's
    /// manifest. Nothing is written if any account root is missing.
    pub fn plan(&self, reporter: &dyn ProgressReporter) -> Result<PlanResult, Error> {
        let roots = self.config.resolve_account_roots()?;
        info!(
            "Planning run '{}' over {} accounts (preferred: {})",
            self.config.run_label,
            roots.len(),
            self.config.preferred_account
        );

        // Phase 1: Scan
        let scan_start = Instant::now();
        reporter.on_scan_start();
        let scanned = scanner::scan_accounts(&roots, &self.filter, reporter)?;
        let scan_duration = scan_start.elapsed();
        let records = scanned.records;
        let skipped_non_utf8 = scanned.non_utf8.len();
        let files_scanned = records.len();
        reporter.on_scan_complete(files_scanned, scan_duration.as_secs_f64());
        debug!(
            "Scan completed in {:.2}s: {} media files, {} skipped for non-UTF-8 paths",
            scan_duration.as_secs_f64(),
            files_scanned,
            skipped_non_utf8
        );

        // Phase 2: Hash, then group once every file is hashed
        let hash_start = Instant::now();
        reporter.on_hash_start(files_scanned);
        let (fingerprinted, unreadable) = hasher::hash_records(records, reporter);
        let groups = resolver::resolve(
            fingerprinted,
            CanonicalOrder::new(&self.config.preferred_account),
        );
        let hash_duration = hash_start.elapsed();
        reporter.on_hash_complete(groups.len(), hash_duration.as_secs_f64());
        debug!(
            "Hash completed in {:.2}s: {} distinct fingerprints, {} unreadable",
            hash_duration.as_secs_f64(),
            groups.len(),
            unreadable.len()
        );

        // Phase 3: Filter against what the store already holds
        let index = self.store.index()?;
        let partition = index.partition(groups);
        debug!(
            "Store holds {} fingerprints; {} groups are new",
            index.len(),
            partition.new_groups.len()
        );

        // Phase 4: Manifest
        let manifest = Manifest::build(
            &partition.new_groups,
            &partition.already_present,
            &self.config.run_label,
            &self.config.preferred_account,
        );
        let paths = self.manifest_paths();
        manifest.write(&paths)?;
        reporter.on_manifest_written(manifest.row_count(), &paths.dir.to_string_lossy());

        Ok(PlanResult {
            scan_duration,
            hash_duration,
            manifest_dir: paths.dir,
            files_scanned,
            unreadable: unreadable.len(),
            skipped_non_utf8,
            unique: manifest.unique.len(),
            duplicates: manifest.duplicates.len(),
            already_present: manifest.already_present.len(),
        })
    }

    pub fn read_manifest(&self) -> Result<Manifest, Error> {
        Manifest::read(&self.manifest_paths())
    }

    pub fn materialize(&self, reporter: &dyn ProgressReporter) -> Result<MaterializeSummary, Error> {
        let manifest = self.read_manifest()?;
        info!(
            "Materializing {} canonicals into {}",
            manifest.unique.len(),
            self.store.root().display()
        );
        Ok(store::materialize(&self.store, &manifest.unique, reporter)?)
    }

    pub fn write_sidecars(
        &self,
        reporter: &dyn ProgressReporter,
        imported_at: DateTime<Utc>,
    ) -> Result<SidecarSummary, Error> {
        let manifest = self.read_manifest()?;
        let ctx = SidecarContext {
            store: &self.store,
            archive_root: &self.config.archive_root,
            takeout_batch_id: self.config.takeout_batch_id(),
            ingest_tool: &self.config.ingest_tool,
            imported_at,
        };
        Ok(metadata::write_sidecars(&manifest, &ctx, reporter))
    }

    /// Write the by-hash inventory of the store into the manifest root.
    pub fn inventory(&self, generated_at: DateTime<Utc>) -> Result<InventoryResult, Error> {
        let rows = self.store.inventory(&generated_at)?;
        let path = self.config.manifest_root().join(INVENTORY_FILE);
        write_inventory(&path, &rows)?;
        Ok(InventoryResult {
            entries: rows.len(),
            total_bytes: rows.iter().map(|r| r.bytes).sum(),
            path,
        })
    }

    pub fn check_store(&self) -> Result<StoreHealth, Error> {
        Ok(self.store.health(HEALTH_LISTING_LIMIT)?)
    }

    pub fn verify_store(&self) -> Result<VerifyReport, Error> {
        Ok(self.store.verify()?)
    }
}
