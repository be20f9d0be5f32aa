//! Configuration file and environment overrides.
//!
//! Lookup order for the file: an explicit path, `genizah-search.toml` in the
//! working directory, then `<config dir>/genizah-search/config.toml`. Missing
//! files fall back to defaults. `GENIZAH_INDEX_PATH` and `GENIZAH_BATCH_SIZE`
//! override whatever the file says.

use crate::builder::{BuildOptions, DEFAULT_BATCH_SIZE};
use crate::error::{Result, SearchError};
use crate::searcher::SearchSettings;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "genizah-search.toml";
pub const INDEX_PATH_ENV: &str = "GENIZAH_INDEX_PATH";
pub const BATCH_SIZE_ENV: &str = "GENIZAH_BATCH_SIZE";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub index: IndexConfig,
    pub search: SearchSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexConfig {
    pub path: PathBuf,
    pub batch_size: usize,
    pub strip_line_numbers: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("index"),
            batch_size: DEFAULT_BATCH_SIZE,
            strip_line_numbers: true,
        }
    }
}

impl IndexConfig {
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            strip_line_numbers: self.strip_line_numbers,
            batch_size: self.batch_size,
        }
    }
}

impl Config {
    /// Loads the configuration the binary runs with.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit.map(Path::to_path_buf).or_else(Self::discover) {
            Some(path) => Self::load_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// First existing config file in the default locations.
    pub fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.is_file() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|dir| dir.join("genizah-search").join("config.toml"))
            .filter(|path| path.is_file())
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SearchError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Self::from_toml(&text).map_err(|e| match e {
            SearchError::InvalidConfig(message) => {
                SearchError::InvalidConfig(format!("{}: {}", path.display(), message))
            }
            other => other,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| SearchError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = lookup(INDEX_PATH_ENV).filter(|p| !p.is_empty()) {
            self.index.path = PathBuf::from(expand_tilde(&path).as_ref());
        }
        if let Some(size) = lookup(BATCH_SIZE_ENV) {
            self.index.batch_size = size.trim().parse().map_err(|_| {
                SearchError::InvalidConfig(format!(
                    "{} must be a positive integer, got '{}'",
                    BATCH_SIZE_ENV, size
                ))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.index.build_options().validate()?;
        self.search
            .bm25
            .validate()
            .map_err(SearchError::InvalidConfig)?;
        if self.search.highlight.fragment_chars == 0 {
            return Err(SearchError::InvalidConfig(
                "search.highlight.fragment_chars must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Expands a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> Cow<'_, str> {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return Cow::Owned(home.join(stripped).display().to_string());
        }
    } else if path == "~"
        && let Some(home) = dirs::home_dir()
    {
        return Cow::Owned(home.display().to_string());
    }
    Cow::Borrowed(path)
}
