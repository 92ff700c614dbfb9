use crate::config::types::{Result, SandboxConfig, SandboxError};
/// Configuration loading from patternbox.json
use std::path::Path;

/// File name probed in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "patternbox.json";

impl SandboxConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SandboxError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: SandboxConfig = serde_json::from_str(&content)
            .map_err(|e| SandboxError::Config(format!("Failed to parse config JSON: {}", e)))?;

        log::debug!("Loaded sandbox config from {}", path.display());
        Ok(config)
    }

    /// Load ./patternbox.json when present, otherwise the built-in defaults
    pub fn load_default() -> Result<Self> {
        let config_path = std::env::current_dir()
            .map_err(|e| SandboxError::Config(format!("Failed to get current directory: {}", e)))?
            .join(DEFAULT_CONFIG_FILE);

        if !config_path.exists() {
            log::debug!("{} not found, using built-in defaults", DEFAULT_CONFIG_FILE);
            return Ok(Self::default());
        }

        Self::load_from_file(config_path)
    }
}
