use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::destination::{default_path_formats, PathFormats};
use crate::error::Result;
use crate::sanitize::PathStyle;

/// Library settings read from a TOML file. Every key is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// SQLite database file.
    pub database: PathBuf,
    /// Root directory destinations are resolved under.
    pub directory: PathBuf,
    /// Template per format name (`default`, `comp`).
    pub path_formats: PathFormats,
    /// File stem for album art placed next to the tracks.
    pub art_filename: String,
    /// Naming convention for destinations; the host's when unset.
    pub path_style: Option<PathStyle>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("library.db"),
            directory: PathBuf::from("Music"),
            path_formats: default_path_formats(),
            art_filename: "cover".to_string(),
            path_style: None,
        }
    }
}

impl LibraryConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn path_style(&self) -> PathStyle {
        self.path_style.unwrap_or_else(PathStyle::host)
    }
}
