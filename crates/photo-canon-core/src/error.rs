use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Source root for account '{account}' does not exist: {}", path.display())]
    MissingSourceRoot { account: String, path: PathBuf },

    #[error(
        "Source roots overlap: '{first}' ({}) and '{second}' ({})",
        first_path.display(),
        second_path.display()
    )]
    OverlappingSourceRoots {
        first: String,
        first_path: PathBuf,
        second: String,
        second_path: PathBuf,
    },

    #[error("Expected manifest not found: {}", .0.display())]
    ManifestMissing(PathBuf),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Errors raised before any side effect because the configured inputs are unusable.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::InvalidConfig(_)
                | Error::MissingSourceRoot { .. }
                | Error::OverlappingSourceRoots { .. }
        )
    }
}
