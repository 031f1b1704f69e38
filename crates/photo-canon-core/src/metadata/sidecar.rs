use super::candidate::GeoData;
use crate::error::Error;
use crate::store::publish_overwrite;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

pub const SIDECAR_VERSION: u32 = 1;
pub const SOURCE_SYSTEM: &str = "google-photos-takeout";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarSource {
    pub system: String,
    pub google_photo_ids: Vec<String>,
    /// First of `google_photo_ids`, or empty.
    pub google_photo_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub takeout_batch_id: String,
    pub imported_at: String,
    pub ingest_tool: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalLocation {
    pub filename: String,
    pub takeout_path: String,
    pub metadata_path: String,
}

/// The merged metadata record stored next to a canonical media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarRecord {
    pub version: u32,
    pub source: SidecarSource,
    pub provenance: Provenance,
    pub original: OriginalLocation,
    pub people: Vec<String>,
    pub geo_data: Option<GeoData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_at_iso: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_at_source: Option<String>,
}

impl SidecarRecord {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Pretty JSON written beside `dest` and renamed over it, so readers never
    /// see a half-written record.
    pub fn write(&self, dest: &Path, partial: &Path) -> Result<(), Error> {
        let mut json = serde_json::to_vec_pretty(self)?;
        json.push(b'\n');
        let result = write_synced(partial, &json).and_then(|_| publish_overwrite(partial, dest));
        if result.is_err() {
            let _ = fs::remove_file(partial);
        }
        Ok(result?)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
