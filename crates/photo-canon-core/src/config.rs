use crate::error::Error;
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "PHOTO_CANON";

const DEFAULT_MEDIA_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "heic", "tif", "tiff", "mp4", "mov", "m4v", "avi", "3gp", "mpg",
    "mpeg", "webm",
];

/// Settings for one process. Loaded once in `main` and passed by reference to
/// every stage; nothing below the CLI reads the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub archive_root: PathBuf,
    #[serde(default)]
    pub source_root: Option<PathBuf>,
    #[serde(default)]
    pub store_dir: Option<PathBuf>,
    #[serde(default)]
    pub manifest_dir: Option<PathBuf>,
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default)]
    pub preferred_account: String,
    #[serde(default = "default_run_label")]
    pub run_label: String,
    #[serde(default)]
    pub takeout_batch_id: Option<String>,
    #[serde(default = "default_ingest_tool")]
    pub ingest_tool: String,
    #[serde(default = "default_media_extensions")]
    pub media_extensions: Vec<String>,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default = "default_sidecar_suffix")]
    pub sidecar_suffix: String,
}

fn default_run_label() -> String {
    "run".to_string()
}

fn default_ingest_tool() -> String {
    "photo-canon".to_string()
}

fn default_sidecar_suffix() -> String {
    "photocanon".to_string()
}

fn default_media_extensions() -> Vec<String> {
    DEFAULT_MEDIA_EXTENSIONS.iter().map(|s| s.to_string()).collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            archive_root: PathBuf::new(),
            source_root: None,
            store_dir: None,
            manifest_dir: None,
            accounts: Vec::new(),
            preferred_account: String::new(),
            run_label: default_run_label(),
            takeout_batch_id: None,
            ingest_tool: default_ingest_tool(),
            media_extensions: default_media_extensions(),
            ignore_patterns: Vec::new(),
            sidecar_suffix: default_sidecar_suffix(),
        }
    }
}

/// Load `Config.toml` (or `path` when given) overlaid with `PHOTO_CANON_*`
/// environment variables. List-valued keys are space separated in the environment.
pub fn load_configuration(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let file_source = match path {
        Some(path) => ConfigFile::from(path).required(true),
        None => ConfigFile::with_name("Config").required(false),
    };

    let builder = Config::builder()
        .add_source(file_source)
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(" ")
                .with_list_parse_key("accounts")
                .with_list_parse_key("media_extensions")
                .with_list_parse_key("ignore_patterns"),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

impl AppConfig {
    pub fn store_dir(&self) -> PathBuf {
        self.store_dir
            .clone()
            .unwrap_or_else(|| self.archive_root.join("CANON"))
    }

    pub fn manifest_root(&self) -> PathBuf {
        self.manifest_dir
            .clone()
            .unwrap_or_else(|| self.archive_root.join("MANIFESTS"))
    }

    pub fn takeout_batch_id(&self) -> &str {
        self.takeout_batch_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or(&self.run_label)
    }

    /// Where an account's unzipped export is expected to live.
    pub fn account_root(&self, account: &str) -> PathBuf {
        match &self.source_root {
            Some(root) => {
                let candidate = root.join(account);
                if candidate.is_dir() {
                    candidate
                } else {
                    root.clone()
                }
            }
            None => self
                .archive_root
                .join("GOOGLE_TAKEOUT")
                .join(account)
                .join("unzipped"),
        }
    }

    /// Resolve every account root, failing on the first one missing on disk or
    /// on any pair that would scan the same files twice.
    pub fn resolve_account_roots(&self) -> Result<Vec<(String, PathBuf)>, Error> {
        let mut roots = Vec::with_capacity(self.accounts.len());
        for account in &self.accounts {
            let path = self.account_root(account);
            if !path.is_dir() {
                return Err(Error::MissingSourceRoot {
                    account: account.clone(),
                    path,
                });
            }
            roots.push((account.clone(), path));
        }

        if let Some((first, second)) = find_overlapping_roots(&roots) {
            return Err(Error::OverlappingSourceRoots {
                first: first.0.clone(),
                first_path: first.1.clone(),
                second: second.0.clone(),
                second_path: second.1.clone(),
            });
        }

        Ok(roots)
    }

    /// Checks that need no filesystem access. Runs before any scanning.
    pub fn validate(&self) -> Result<(), Error> {
        if self.archive_root.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("archive_root is required".into()));
        }
        if self.accounts.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one account is required".into(),
            ));
        }

        let mut seen = BTreeSet::new();
        for account in &self.accounts {
            if account.trim().is_empty() {
                return Err(Error::InvalidConfig("account names must not be empty".into()));
            }
            if !seen.insert(account.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "account '{}' is listed more than once",
                    account
                )));
            }
        }

        if self.preferred_account.trim().is_empty() {
            return Err(Error::InvalidConfig("preferred_account is required".into()));
        }
        if !seen.contains(self.preferred_account.as_str()) {
            return Err(Error::InvalidConfig(format!(
                "preferred account '{}' is not one of the configured accounts {:?}",
                self.preferred_account, self.accounts
            )));
        }

        if !is_single_component(&self.run_label) {
            return Err(Error::InvalidConfig(format!(
                "run_label '{}' must be a non-empty single path component",
                self.run_label
            )));
        }
        if !is_single_component(&self.sidecar_suffix) || self.sidecar_suffix.contains('.') {
            return Err(Error::InvalidConfig(format!(
                "sidecar_suffix '{}' must be a non-empty name without dots or separators",
                self.sidecar_suffix
            )));
        }
        if self.media_extensions.is_empty() {
            return Err(Error::InvalidConfig(
                "media_extensions must not be empty".into(),
            ));
        }
        for pattern in &self.ignore_patterns {
            glob::Pattern::new(pattern).map_err(|err| {
                Error::InvalidConfig(format!("invalid ignore pattern '{}': {}", pattern, err))
            })?;
        }

        Ok(())
    }
}

fn is_single_component(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains('/')
        && !value.contains('\\')
}

/// Return the first pair of roots where one equals or contains the other.
pub fn find_overlapping_roots(
    roots: &[(String, PathBuf)],
) -> Option<(&(String, PathBuf), &(String, PathBuf))> {
    for (i, a) in roots.iter().enumerate() {
        for b in &roots[i + 1..] {
            if a.1.starts_with(&b.1) || b.1.starts_with(&a.1) {
                return Some((a, b));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn valid_config() -> AppConfig {
        AppConfig {
            archive_root: PathBuf::from("/archive"),
            accounts: vec!["alice".to_string(), "bob".to_string()],
            preferred_account: "bob".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_accepts_consistent_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_preferred_account_must_be_configured() {
        let config = AppConfig {
            preferred_account: "carol".to_string(),
            ..valid_config()
        };
        let err = config.validate().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("carol"));
    }

    #[test]
    fn test_repeated_account_rejected() {
        let config = AppConfig {
            accounts: vec!["bob".to_string(), "bob".to_string()],
            ..valid_config()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_run_label_must_be_single_component() {
        let config = AppConfig {
            run_label: "2024/01".to_string(),
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_ignore_glob_rejected() {
        let config = AppConfig {
            ignore_patterns: vec!["**/[".to_string()],
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_layout_paths() {
        let config = valid_config();
        assert_eq!(config.store_dir(), PathBuf::from("/archive/CANON"));
        assert_eq!(config.manifest_root(), PathBuf::from("/archive/MANIFESTS"));
        assert_eq!(
            config.account_root("alice"),
            PathBuf::from("/archive/GOOGLE_TAKEOUT/alice/unzipped")
        );
        assert_eq!(config.takeout_batch_id(), "run");
    }

    #[test]
    fn test_source_root_override_prefers_account_subdir() {
        let tmp = tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("alice")).unwrap();
        let config = AppConfig {
            source_root: Some(tmp.path().to_path_buf()),
            ..valid_config()
        };
        assert_eq!(config.account_root("alice"), tmp.path().join("alice"));
        assert_eq!(config.account_root("bob"), tmp.path().to_path_buf());
    }

    #[test]
    fn test_missing_root_is_configuration_error() {
        let tmp = tempdir().unwrap();
        let config = AppConfig {
            archive_root: tmp.path().to_path_buf(),
            ..valid_config()
        };
        let err = config.resolve_account_roots().unwrap_err();
        assert!(err.is_configuration());
        assert!(matches!(err, Error::MissingSourceRoot { ref account, .. } if account == "alice"));
    }

    #[test]
    fn test_overlapping_roots_detected() {
        let roots = vec![
            ("alice".to_string(), PathBuf::from("/takeout")),
            ("bob".to_string(), PathBuf::from("/other")),
            ("carol".to_string(), PathBuf::from("/takeout/carol")),
        ];
        let (a, b) = find_overlapping_roots(&roots).unwrap();
        assert_eq!(a.0, "alice");
        assert_eq!(b.0, "carol");

        let disjoint = vec![
            ("alice".to_string(), PathBuf::from("/takeout/alice")),
            ("bob".to_string(), PathBuf::from("/takeout/bob")),
        ];
        assert!(find_overlapping_roots(&disjoint).is_none());
    }
}
