//! `vstage.toml` handling.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;
use vstage_digest::Algorithm;

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "vstage.toml";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where the active stage is recorded.
    pub stage_file: PathBuf,
    /// Primary digest algorithm for new objects.
    pub algorithm: String,
    pub fixity: Vec<String>,
    /// Digest workers; 0 means one per CPU.
    pub jobs: usize,
    pub include_hidden: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stage_file: PathBuf::from("vstage-stage.json"),
            algorithm: Algorithm::Sha512.id().to_string(),
            fixity: Vec::new(),
            jobs: 0,
            include_hidden: false,
        }
    }
}

impl Config {
    /// Load `explicit`, or `./vstage.toml` if it exists, or the defaults.
    ///
    /// An explicitly named file must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = Self::from_toml(&text)
            .with_context(|| format!("invalid config {}", path.display()))?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.algorithm()?;
        config.fixity_algorithms()?;
        Ok(config)
    }

    pub fn algorithm(&self) -> Result<Algorithm> {
        Ok(Algorithm::from_id(&self.algorithm)?)
    }

    pub fn fixity_algorithms(&self) -> Result<Vec<Algorithm>> {
        parse_algorithms(&self.fixity)
    }
}

/// Parse algorithm ids, failing on the first unknown one.
pub fn parse_algorithms(ids: &[String]) -> Result<Vec<Algorithm>> {
    ids.iter()
        .map(|id| Algorithm::from_id(id.trim()).map_err(Into::into))
        .collect()
}
