use indicatif::{ProgressBar, ProgressStyle};
use photo_canon_core::ProgressReporter;
use std::sync::Mutex;
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Scan phase: spinner (unknown total files upfront)
/// - Hash, materialize and sidecar phases: progress bar over a known total
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.take() {
            pb.finish_and_clear();
        }
    }

    fn start_counted(&self, label: &str, total: usize) {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::with_template(&format!(
                "  {{spinner:.cyan}} {} [{{bar:30.cyan/dim}}] {{pos}}/{{len}} ({{eta}} remaining)",
                label
            ))
            .unwrap()
            .progress_chars("━╸─")
            .tick_chars(TICK_CHARS),
        );
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn advance(&self, done: usize, total: usize) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            if pb.length() != Some(total as u64) {
                pb.set_length(total as u64);
            }
            pb.set_position(done as u64);
        }
    }
}

impl Default for CliReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for CliReporter {
    fn on_scan_start(&self) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_chars(TICK_CHARS),
        );
        pb.set_message("Scanning accounts...");
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_scan_progress(&self, files_found: usize, _current_path: &str) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            pb.set_message(format!("Scanning... {} media files found", files_found));
        }
    }

    fn on_scan_complete(&self, total_files: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Scan complete: {} media files in {:.2}s",
            total_files, duration_secs
        );
    }

    fn on_hash_start(&self, total_files: usize) {
        self.start_counted("Hashing", total_files);
    }

    fn on_hash_progress(&self, files_hashed: usize, total_files: usize) {
        self.advance(files_hashed, total_files);
    }

    fn on_hash_complete(&self, groups: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Hash complete: {} distinct items in {:.2}s",
            groups, duration_secs
        );
    }

    fn on_manifest_written(&self, rows: usize, dir: &str) {
        eprintln!("  \x1b[32m✓\x1b[0m Manifest written: {} rows in {}", rows, dir);
    }

    fn on_materialize_start(&self, total: usize) {
        self.start_counted("Copying", total);
    }

    fn on_materialize_progress(&self, done: usize, total: usize) {
        self.advance(done, total);
    }

    fn on_materialize_complete(&self, copied: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Materialize complete: {} copied in {:.2}s",
            copied, duration_secs
        );
    }

    fn on_sidecar_start(&self, total: usize) {
        self.start_counted("Sidecars", total);
    }

    fn on_sidecar_progress(&self, done: usize, total: usize) {
        self.advance(done, total);
    }

    fn on_sidecar_complete(&self, written: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Sidecars complete: {} written in {:.2}s",
            written, duration_secs
        );
    }
}
