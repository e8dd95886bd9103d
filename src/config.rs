use std::path::{Path, PathBuf};

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::error::{RefError, Result};

static PLACEHOLDER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{([^{}]*)\}").expect("Invalid placeholder regex pattern")
});

/// Placeholders understood in `filename_template`.
pub const TEMPLATE_PLACEHOLDERS: &[&str] =
    &["author", "journal", "abbreviation", "volume", "number", "year", "ext"];

/// User settings, loaded from `~/.config/reftool/config.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Root of the managed article tree (`<root>/<year>/<author>/...`).
    pub library_root: String,
    pub filename_template: String,
    /// Optional `Full Journal Name = Abbrev.` file.
    #[serde(default)]
    pub abbreviations: Option<String>,
    pub registry: RegistrySettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistrySettings {
    pub crossref_url: String,
    pub datacite_url: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Total time spent retrying transient failures.
    pub max_retry_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            library_root: "~/Documents/Papers".to_string(),
            filename_template: "{author}_{abbreviation}-{volume}_{year}{ext}".to_string(),
            abbreviations: None,
            registry: RegistrySettings::default(),
        }
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            crossref_url: "https://api.crossref.org".to_string(),
            datacite_url: "https://api.datacite.org".to_string(),
            timeout_secs: 20,
            max_retry_secs: 30,
        }
    }
}

impl Settings {
    /// Config file location: `$REFTOOL_CONFIG`, else `<config dir>/reftool/config.toml`.
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("REFTOOL_CONFIG") {
            return Some(expand_tilde(&path));
        }
        dirs::config_dir().map(|dir| dir.join("reftool").join("config.toml"))
    }

    /// Load from an explicit path, or from the standard location with
    /// defaults when no file exists there.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(RefError::Config(format!("config file {} not found", path.display())));
            }
            return Self::load_from(path);
        }
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| RefError::fs(path, e))?;
        let settings: Self = toml::from_str(&contents)
            .map_err(|e| RefError::Config(format!("{}: {}", path.display(), e)))?;
        settings.validate()?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Reject templates with unknown placeholders.
    pub fn validate(&self) -> Result<()> {
        for name in placeholders(&self.filename_template) {
            if !TEMPLATE_PLACEHOLDERS.contains(&name) {
                return Err(RefError::Config(format!(
                    "unknown placeholder {{{}}} in filename_template (expected one of {})",
                    name,
                    TEMPLATE_PLACEHOLDERS.join(", ")
                )));
            }
        }
        if self.library_root.trim().is_empty() {
            return Err(RefError::Config("library_root is empty".to_string()));
        }
        Ok(())
    }

    pub fn library_root(&self) -> PathBuf {
        expand_tilde(&self.library_root)
    }

    pub fn abbreviations_path(&self) -> Option<PathBuf> {
        self.abbreviations.as_deref().map(expand_tilde)
    }
}

/// Names of the `{placeholder}`s in a template, in order.
pub fn placeholders(template: &str) -> Vec<&str> {
    PLACEHOLDER_REGEX
        .captures_iter(template)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect()
}

/// Replace a leading `~` with the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let home = dirs::home_dir();
    match (path.strip_prefix('~'), home) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) if rest.starts_with('/') => home.join(rest.trim_start_matches('/')),
        _ => PathBuf::from(path),
    }
}

/// Show a path relative to the home directory as `~/...`.
pub fn compress_user(path: &Path) -> PathBuf {
    match dirs::home_dir().and_then(|home| path.strip_prefix(home).ok().map(Path::to_path_buf)) {
        Some(relative) => Path::new("~").join(relative),
        None => path.to_path_buf(),
    }
}
