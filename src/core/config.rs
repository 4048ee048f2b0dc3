//! Bridge configuration with documented defaults
//!
//! Loaded once at host startup (usually from a TOML file) and then shared
//! read-only by every script session.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::error::{MacroError, Result};

/// Configuration for the script runtime bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Extra directories scripts may `require` modules from
    ///
    /// Each entry is validated before it is appended to `arc.require.paths`.
    /// Entries that fail validation are skipped with a warning rather than
    /// aborting startup.
    pub require_paths: Vec<PathBuf>,

    /// Passes allowed per registered modifier parser before preprocessing
    /// of a line is abandoned
    ///
    /// A line needs one pass per directive of the same kind plus one final
    /// pass that finds nothing. At 16, a line may carry 15 directives of a
    /// single kind.
    pub max_passes_per_parser: usize,

    /// Default wait (seconds) applied when a script calls `arc.wait()`
    /// without an argument
    pub default_wait_seconds: f64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            require_paths: Vec::new(),
            max_passes_per_parser: 16,
            default_wait_seconds: 0.0,
        }
    }
}

impl BridgeConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a TOML file on disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.max_passes_per_parser == 0 {
            return Err(MacroError::Config(
                "max_passes_per_parser must be at least 1".into(),
            ));
        }

        if !self.default_wait_seconds.is_finite() || self.default_wait_seconds < 0.0 {
            return Err(MacroError::Config(format!(
                "default_wait_seconds ({}) must be a non-negative number",
                self.default_wait_seconds
            )));
        }

        Ok(())
    }

    /// Require paths that pass validation, as strings ready for Lua
    pub fn validated_require_paths(&self) -> Vec<String> {
        self.require_paths
            .iter()
            .filter_map(|path| match validate_require_path(path) {
                Ok(valid) => Some(valid),
                Err(reason) => {
                    tracing::warn!("Skipping require path {}: {}", path.display(), reason);
                    None
                }
            })
            .collect()
    }
}

/// Check that a require path is usable by the Lua package searcher
fn validate_require_path(path: &Path) -> std::result::Result<String, String> {
    let as_str = path
        .to_str()
        .ok_or_else(|| "path is not valid UTF-8".to_string())?;

    if as_str.trim().is_empty() {
        return Err("path is empty".into());
    }

    // The Lua searcher uses ';' and '?' as template metacharacters
    if as_str.contains(';') || as_str.contains('?') {
        return Err("path contains ';' or '?'".into());
    }

    if !path.is_dir() {
        return Err("path is not an existing directory".into());
    }

    Ok(as_str.to_string())
}

// === GLOBAL CONFIG ACCESS ===

use std::sync::OnceLock;

static CONFIG: OnceLock<BridgeConfig> = OnceLock::new();

/// Get the global bridge config (initializes with defaults if not set)
pub fn config() -> &'static BridgeConfig {
    CONFIG.get_or_init(BridgeConfig::default)
}

/// Set the global bridge config (can only be called once)
///
/// Returns Err if config was already set.
pub fn set_config(config: BridgeConfig) -> std::result::Result<(), BridgeConfig> {
    CONFIG.set(config)
}
