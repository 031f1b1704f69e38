//! Takeout metadata lookup and the per-canonical merge into sidecar records.

pub mod candidate;
pub mod locate;
pub mod merge;
pub mod sidecar;

pub use candidate::{CaptureTime, GeoData, MetadataCandidate, ParseError, TakenAtSource};
pub use locate::{locate, Lookup};
pub use merge::{write_sidecars, MergedMetadata, SidecarContext, SidecarSummary};
pub use sidecar::SidecarRecord;
