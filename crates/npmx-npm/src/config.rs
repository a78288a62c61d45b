//! Configuration for the npm backend.

use npmx_core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable overriding the default npm path.
pub const NPM_PATH_ENV: &str = "NPMX_NPM_PATH";

/// Configuration for the npm backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NpmConfig {
    /// Explicit path to the npm executable.
    pub npm_path: Option<PathBuf>,
    /// Search `PATH` and well-known install locations when `npm_path` is unusable.
    pub use_fallback: bool,
    /// Kill commands that run longer than this many seconds.
    pub timeout_secs: Option<u64>,
    /// Extra environment variables for every npm invocation.
    pub env: BTreeMap<String, String>,
}

impl Default for NpmConfig {
    fn default() -> Self {
        Self {
            npm_path: std::env::var_os(NPM_PATH_ENV)
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
            use_fallback: true,
            timeout_secs: None,
            env: BTreeMap::new(),
        }
    }
}

impl NpmConfig {
    /// Loads configuration from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| Error::InvalidArgument(format!("{}: {}", path.display(), e)))
    }
}
