use std::env;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILE: &str = "./logs/photo-canon.log";

/// Split a log file path into the directory the appender writes in and the
/// file name. A bare file name lands in the working directory.
fn log_file_location(log_file_path: &str) -> (PathBuf, PathBuf) {
    let path = Path::new(log_file_path);
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file = path
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("photo-canon.log"));
    (dir, file)
}

/// Log to stdout and to `LOG_FILE_PATH`. The first line names the subcommand
/// and the run label given on the command line, if any.
pub fn init_logger(command: &str, run_label: Option<&str>) -> WorkerGuard {
    let filter = env::var("TRACING_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter_layer = EnvFilter::new(filter);

    let log_file_path =
        env::var("LOG_FILE_PATH").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string());
    let (log_dir, log_file) = log_file_location(&log_file_path);

    let file_appender = tracing_appender::rolling::never(&log_dir, &log_file);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .pretty()
                .with_file(false)
                .without_time()
                .with_ansi(true),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_target(false)
                .with_ansi(false),
        )
        .with(filter_layer)
        .init();

    info!(
        "photo-canon {} (run label: {}), logging to stdout and {}",
        command,
        run_label.unwrap_or("from config"),
        log_dir.join(&log_file).display()
    );

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_location_splits_directory() {
        assert_eq!(
            log_file_location("./logs/photo-canon.log"),
            (PathBuf::from("./logs"), PathBuf::from("photo-canon.log"))
        );
        assert_eq!(
            log_file_location("/var/log/canon/run.log"),
            (PathBuf::from("/var/log/canon"), PathBuf::from("run.log"))
        );
    }

    #[test]
    fn test_bare_log_file_lands_in_working_directory() {
        assert_eq!(
            log_file_location("canon.log"),
            (PathBuf::from("."), PathBuf::from("canon.log"))
        );
    }
}
