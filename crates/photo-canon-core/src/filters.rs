//! Name and path predicates shared by everything that walks a directory:
//! the source scanner, the store index and the store health checks.

use crate::config::AppConfig;
use crate::error::Error;
use glob::Pattern;
use std::collections::BTreeSet;
use std::path::Path;

/// Prefix of the temporary files the store writes before publishing an entry.
pub const PARTIAL_PREFIX: &str = ".partial-";

/// Filesystem and sync artifacts that never carry media.
pub fn is_ignorable(name: &str) -> bool {
    name.is_empty() || name.starts_with("._") || name == ".DS_Store"
}

pub fn is_partial(name: &str) -> bool {
    name.starts_with(PARTIAL_PREFIX)
}

/// Lowercased extension with its leading dot, e.g. `.jpg`.
pub fn dotted_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext.to_lowercase()))
}

#[derive(Debug, Clone)]
pub struct FileFilter {
    media_extensions: BTreeSet<String>,
    sidecar_ending: String,
    ignore_patterns: Vec<Pattern>,
}

impl FileFilter {
    pub fn new(
        media_extensions: &[String],
        sidecar_suffix: &str,
        ignore_globs: &[String],
    ) -> Result<Self, Error> {
        let media_extensions = media_extensions
            .iter()
            .map(|ext| format!(".{}", ext.trim_start_matches('.').to_lowercase()))
            .collect();

        let ignore_patterns = ignore_globs
            .iter()
            .map(|glob| {
                Pattern::new(glob).map_err(|err| {
                    Error::InvalidConfig(format!("invalid ignore pattern '{}': {}", glob, err))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            media_extensions,
            sidecar_ending: format!(".{}.json", sidecar_suffix),
            ignore_patterns,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        Self::new(
            &config.media_extensions,
            &config.sidecar_suffix,
            &config.ignore_patterns,
        )
    }

    pub fn is_ignorable(&self, name: &str) -> bool {
        is_ignorable(name)
    }

    pub fn is_sidecar(&self, name: &str) -> bool {
        name.ends_with(&self.sidecar_ending)
    }

    pub fn sidecar_ending(&self) -> &str {
        &self.sidecar_ending
    }

    pub fn is_media(&self, path: &Path) -> bool {
        dotted_extension(path).is_some_and(|ext| self.media_extensions.contains(&ext))
    }

    pub fn is_ignored_path(&self, path: &Path) -> bool {
        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(path))
    }

    /// Whether a scanned file should become a media record.
    pub fn accepts(&self, path: &Path) -> bool {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => return false,
        };
        !self.is_ignorable(name)
            && !self.is_sidecar(name)
            && !self.is_ignored_path(path)
            && self.is_media(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn filter() -> FileFilter {
        FileFilter::new(
            &["jpg".to_string(), ".MP4".to_string()],
            "photocanon",
            &["**/Trash/**".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_junk_names() {
        assert!(is_ignorable(""));
        assert!(is_ignorable("._IMG_0001.JPG"));
        assert!(is_ignorable(".DS_Store"));
        assert!(!is_ignorable("IMG_0001.JPG"));
        assert!(!is_ignorable(".hidden.jpg"));
    }

    #[test]
    fn test_media_extension_is_case_insensitive() {
        let f = filter();
        assert!(f.is_media(Path::new("a/IMG_0001.JPG")));
        assert!(f.is_media(Path::new("a/clip.mp4")));
        assert!(!f.is_media(Path::new("a/IMG_0001.JPG.json")));
        assert!(!f.is_media(Path::new("a/noext")));
    }

    #[test]
    fn test_accepts_rejects_sidecars_junk_and_ignored() {
        let f = filter();
        assert!(f.accepts(&PathBuf::from("/t/Photos/IMG_1.jpg")));
        assert!(!f.accepts(&PathBuf::from("/t/Photos/._IMG_1.jpg")));
        assert!(!f.accepts(&PathBuf::from("/t/Trash/IMG_1.jpg")));
        assert!(f.is_sidecar("abc.jpg.photocanon.json"));
        assert!(!f.accepts(&PathBuf::from("/t/abc.jpg.photocanon.json")));
    }

    #[test]
    fn test_dotted_extension() {
        assert_eq!(dotted_extension(Path::new("x/A.HEIC")), Some(".heic".to_string()));
        assert_eq!(dotted_extension(Path::new("x/README")), None);
    }
}
