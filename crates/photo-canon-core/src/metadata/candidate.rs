use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const PHOTO_URL_MARKER: &str = "/photo/";
const PHOTO_ID_KEYS: &[&str] = &["photoId", "mediaId", "googlePhotoId", "id"];
const MIN_PHOTO_ID_LENGTH: usize = 10;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("cannot read {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("metadata root is not a JSON object")]
    NotAnObject,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoData {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub latitude_span: Option<f64>,
    pub longitude_span: Option<f64>,
}

impl GeoData {
    /// Numeric fields only; `None` when the object carries none of them.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let field = |key: &str| object.get(key).and_then(Value::as_f64);
        let geo = GeoData {
            latitude: field("latitude"),
            longitude: field("longitude"),
            altitude: field("altitude"),
            latitude_span: field("latitudeSpan"),
            longitude_span: field("longitudeSpan"),
        };
        (!geo.is_empty()).then_some(geo)
    }

    pub fn is_empty(&self) -> bool {
        self.latitude.is_none()
            && self.longitude.is_none()
            && self.altitude.is_none()
            && self.latitude_span.is_none()
            && self.longitude_span.is_none()
    }
}

/// Which field a capture time was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakenAtSource {
    PhotoTakenTime,
    CreationTime,
}

impl TakenAtSource {
    pub fn key(&self) -> &'static str {
        match self {
            TakenAtSource::PhotoTakenTime => "photoTakenTime",
            TakenAtSource::CreationTime => "creationTime",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTime {
    pub at: DateTime<Utc>,
    pub source: TakenAtSource,
}

/// The fields this pipeline uses from one per-occurrence metadata JSON.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataCandidate {
    pub title: Option<String>,
    pub photo_ids: BTreeSet<String>,
    pub people: BTreeSet<String>,
    pub geo: Option<GeoData>,
    pub taken_at: Option<CaptureTime>,
}

impl MetadataCandidate {
    pub fn load(path: &Path) -> Result<Self, ParseError> {
        let text = fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, ParseError> {
        let object = value.as_object().ok_or(ParseError::NotAnObject)?;

        let title = object
            .get("title")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let geo = object
            .get("geoData")
            .and_then(GeoData::from_value)
            .or_else(|| object.get("geoDataExif").and_then(GeoData::from_value));

        Ok(MetadataCandidate {
            title,
            photo_ids: extract_photo_ids(value, object),
            people: extract_people(object),
            geo,
            taken_at: extract_capture_time(object),
        })
    }
}

fn extract_photo_ids(value: &Value, object: &Map<String, Value>) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();

    if let Some(url) = object.get("url").and_then(Value::as_str) {
        if let Some(id) = photo_id_from_url(url) {
            ids.insert(id.to_string());
        }
    }

    for key in PHOTO_ID_KEYS {
        if let Some(id) = deep_find_string(value, key) {
            if id.len() >= MIN_PHOTO_ID_LENGTH && !id.contains("http") {
                ids.insert(id.to_string());
            }
        }
    }

    ids
}

/// The path segment following `/photo/` in a share URL.
pub fn photo_id_from_url(url: &str) -> Option<&str> {
    let start = url.find(PHOTO_URL_MARKER)? + PHOTO_URL_MARKER.len();
    let rest = &url[start..];
    let end = rest.find(&['/', '?', '#'][..]).unwrap_or(rest.len());
    let id = &rest[..end];
    (!id.is_empty()).then_some(id)
}

/// First non-blank string stored under `key` anywhere in the tree, depth first.
fn deep_find_string<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                if k == key {
                    if let Some(s) = v.as_str().map(str::trim).filter(|s| !s.is_empty()) {
                        return Some(s);
                    }
                }
                if let Some(found) = deep_find_string(v, key) {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(items) => items.iter().find_map(|item| deep_find_string(item, key)),
        _ => None,
    }
}

fn extract_people(object: &Map<String, Value>) -> BTreeSet<String> {
    object
        .get("people")
        .and_then(Value::as_array)
        .map(|people| {
            people
                .iter()
                .filter_map(|p| p.get("name").and_then(Value::as_str))
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn extract_capture_time(object: &Map<String, Value>) -> Option<CaptureTime> {
    [TakenAtSource::PhotoTakenTime, TakenAtSource::CreationTime]
        .into_iter()
        .find_map(|source| {
            let raw = object.get(source.key())?.get("timestamp")?;
            let seconds = match raw {
                Value::String(s) => s.trim().parse::<i64>().ok()?,
                Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
                _ => return None,
            };
            let at = DateTime::<Utc>::from_timestamp(seconds, 0)?;
            Some(CaptureTime { at, source })
        })
}
