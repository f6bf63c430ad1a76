// Configuration file loading.
//
// Priority order:
// 1. Config file path from KEYROTATOR_CONFIG
// 2. Inline config content from KEYROTATOR_CONFIG_CONTENT
// 3. Default config files (./keyrotator.toml, ./.keyrotator.toml)

use crate::env_overrides::EnvSource;
use crate::StackConfig;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;

pub(crate) const DEFAULT_CONFIG_FILES: &[&str] = &["./keyrotator.toml", "./.keyrotator.toml"];

/// Find the first configured file source, if any.
pub(crate) fn load_from_default_sources<E: EnvSource>(env: &E) -> Result<Option<StackConfig>> {
    if let Some(path) = env.get("CONFIG") {
        return load_from_file_path(&path).map(Some);
    }

    if let Some(content) = env.get("CONFIG_CONTENT") {
        let config = StackConfig::from_toml(&content)
            .context("Failed to parse inline config from KEYROTATOR_CONFIG_CONTENT")?;
        return Ok(Some(config));
    }

    for path in DEFAULT_CONFIG_FILES {
        if Path::new(path).exists() {
            return load_from_file_path(path).map(Some);
        }
    }

    debug!("No config file found, using built-in defaults");
    Ok(None)
}

/// Load configuration from a specific file path (for the CLI --config flag).
/// Returns error if the file doesn't exist or can't be parsed.
pub(crate) fn load_from_file_path(path: impl AsRef<Path>) -> Result<StackConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config = StackConfig::from_toml(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    debug!(path = %path.display(), "Loaded config file");
    Ok(config)
}
