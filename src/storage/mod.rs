//! Storage Layer
//!
//! Resolves where settings live on this platform. Readings themselves are
//! persisted by the host application.

use anyhow::Result;
use std::path::PathBuf;

use crate::config::{self, AppConfig};

const CONFIG_FILE: &str = "config.toml";

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "gasmeterreader", "GasMeterReader")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}

/// Path of the default configuration file
pub fn default_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE))
}

/// Load `path`, or the default config file, falling back to defaults
pub fn load_or_default(path: Option<PathBuf>) -> AppConfig {
    let path = match path {
        Some(path) => Some(path),
        None => default_config_path().ok().filter(|p| p.exists()),
    };

    if let Some(path) = path {
        match config::load_config(&path) {
            Ok(config) => {
                tracing::info!("Loaded configuration from {:?}", path);
                return config;
            }
            Err(e) => tracing::warn!("Ignoring configuration: {:#}", e),
        }
    }

    tracing::info!("Using default configuration");
    AppConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut config = AppConfig::default();
        config.session.error_ceiling = 9;
        config::save_config(&config, &path).unwrap();

        let loaded = load_or_default(Some(path));
        assert_eq!(loaded.session.error_ceiling, 9);
    }

    #[test]
    fn test_missing_explicit_path_falls_back() {
        let dir = TempDir::new().unwrap();
        let loaded = load_or_default(Some(dir.path().join("missing.toml")));
        assert_eq!(loaded.session.error_ceiling, 150);
    }
}
