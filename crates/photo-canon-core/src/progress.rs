/// Trait for reporting pipeline progress.
///
/// The CLI implements it with indicatif bars. All methods have default no-op
/// implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_scan_start(&self) {}
    fn on_scan_progress(&self, _files_found: usize, _current_path: &str) {}
    fn on_scan_complete(&self, _total_files: usize, _duration_secs: f64) {}
    fn on_hash_start(&self, _total_files: usize) {}
    fn on_hash_progress(&self, _files_hashed: usize, _total_files: usize) {}
    fn on_hash_complete(&self, _groups: usize, _duration_secs: f64) {}
    fn on_manifest_written(&self, _rows: usize, _dir: &str) {}
    fn on_materialize_start(&self, _total: usize) {}
    fn on_materialize_progress(&self, _done: usize, _total: usize) {}
    fn on_materialize_complete(&self, _copied: usize, _duration_secs: f64) {}
    fn on_sidecar_start(&self, _total: usize) {}
    fn on_sidecar_progress(&self, _done: usize, _total: usize) {}
    fn on_sidecar_complete(&self, _written: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
