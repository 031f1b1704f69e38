//! Finds the Takeout metadata JSON that belongs to a media file.
//!
//! Takeout names the JSON after the media file but truncates long names and
//! moves duplicate indexes around, so lookup goes through two tiers: exact
//! names first, then a scan of sibling JSON files for the truncated forms.

use super::candidate::MetadataCandidate;
use crate::filters::is_ignorable;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const SUPPLEMENTAL: &str = ".supplemental-metadata";
const JSON: &str = ".json";
/// Shortest JSON base name Takeout produces when it truncates a long media name.
const MIN_TRUNCATED_BASE: usize = 46;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// One of the exact names exists.
    Exact(PathBuf),
    /// A single truncated-name match.
    Single(PathBuf),
    /// Several matches; one had the expected `title`.
    Disambiguated(PathBuf),
    /// Several matches and none had the expected `title`; first in name order.
    Ambiguous(PathBuf),
    NotFound,
}

impl Lookup {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Lookup::Exact(p) | Lookup::Single(p) | Lookup::Disambiguated(p) | Lookup::Ambiguous(p) => {
                Some(p)
            }
            Lookup::NotFound => None,
        }
    }
}

/// Locate the metadata JSON for `media`. JSON names ending in `excluded_ending`
/// (the pipeline's own sidecars) are never candidates.
pub fn locate(media: &Path, excluded_ending: &str) -> io::Result<Lookup> {
    for candidate in exact_candidates(media) {
        if candidate.is_file() {
            return Ok(Lookup::Exact(candidate));
        }
    }

    let (dir, media_name) = match (media.parent(), media.file_name().and_then(|n| n.to_str())) {
        (Some(dir), Some(name)) => (dir, name),
        _ => return Ok(Lookup::NotFound),
    };

    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Lookup::NotFound),
        Err(e) => return Err(e),
    };

    let mut matches = Vec::new();
    for entry in read_dir {
        let entry = entry?;
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(name) => name,
            None => continue,
        };
        if is_ignorable(name) || name.ends_with(excluded_ending) {
            continue;
        }
        let base = match name.strip_suffix(JSON) {
            Some(base) => base,
            None => continue,
        };
        if is_truncated_form(media_name, base) && entry.file_type()?.is_file() {
            matches.push(entry.path());
        }
    }
    matches.sort();

    match matches.len() {
        0 => Ok(Lookup::NotFound),
        1 => Ok(Lookup::Single(matches.remove(0))),
        _ => Ok(disambiguate(media_name, matches)),
    }
}

/// `P.json`, `P.supplemental-metadata.json`, `<P without ext>.supplemental-metadata.json`.
fn exact_candidates(media: &Path) -> Vec<PathBuf> {
    let with_suffix = |base: &Path, suffix: &str| {
        let mut s: OsString = base.as_os_str().to_owned();
        s.push(suffix);
        PathBuf::from(s)
    };
    let mut candidates = vec![
        with_suffix(media, JSON),
        with_suffix(media, &format!("{}{}", SUPPLEMENTAL, JSON)),
    ];
    if media.extension().is_some() {
        candidates.push(with_suffix(
            &media.with_extension(""),
            &format!("{}{}", SUPPLEMENTAL, JSON),
        ));
    }
    candidates
}

/// Split `IMG_1(2).jpg` into (`IMG_1.jpg`, `(2)`).
fn split_duplicate_index(media_name: &str) -> Option<(String, &str)> {
    let (stem, ext) = match media_name.rfind('.') {
        Some(dot) => media_name.split_at(dot),
        None => (media_name, ""),
    };
    let stem_without_close = stem.strip_suffix(')')?;
    let open = stem_without_close.rfind('(')?;
    let digits = &stem_without_close[open + 1..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index = &stem[open..];
    Some((format!("{}{}", &stem[..open], ext), index))
}

/// `base` starts with `name` and continues with nothing or a (possibly
/// truncated) `.supplemental-metadata`.
fn is_name_with_truncated_suffix(name: &str, base: &str) -> bool {
    base.strip_prefix(name)
        .is_some_and(|rest| SUPPLEMENTAL.starts_with(rest))
}

fn is_truncated_form(media_name: &str, base: &str) -> bool {
    if is_name_with_truncated_suffix(media_name, base) {
        return true;
    }

    if let Some((original, index)) = split_duplicate_index(media_name) {
        if let Some(inner) = base.strip_suffix(index) {
            if is_name_with_truncated_suffix(&original, inner) {
                return true;
            }
        }
    }

    base.len() >= MIN_TRUNCATED_BASE && base.len() < media_name.len() && media_name.starts_with(base)
}

fn disambiguate(media_name: &str, matches: Vec<PathBuf>) -> Lookup {
    let original = split_duplicate_index(media_name).map(|(original, _)| original);
    for path in &matches {
        let title = match MetadataCandidate::load(path) {
            Ok(candidate) => candidate.title,
            Err(e) => {
                debug!("Skipping unparsable candidate {}: {}", path.display(), e);
                continue;
            }
        };
        if let Some(title) = title {
            if title == media_name || original.as_deref() == Some(title.as_str()) {
                return Lookup::Disambiguated(path.clone());
            }
        }
    }

    let first = matches[0].clone();
    warn!(
        "{} metadata candidates for '{}' and none titled to match; using {}",
        matches.len(),
        media_name,
        first.display()
    );
    Lookup::Ambiguous(first)
}
