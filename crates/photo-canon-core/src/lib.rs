pub mod config;
pub mod engine;
pub mod error;
pub mod filters;
pub mod hasher;
pub mod manifest;
pub mod metadata;
pub mod model;
pub mod progress;
pub mod resolver;
pub mod scanner;
pub mod store;

pub use config::{load_configuration, AppConfig};
pub use engine::{InventoryResult, Pipeline, PlanResult};
pub use error::Error;
pub use hasher::Fingerprint;
pub use manifest::{Manifest, ManifestPaths};
pub use metadata::SidecarSummary;
pub use progress::{ProgressReporter, SilentReporter};
pub use store::{MaterializeSummary, Store};
