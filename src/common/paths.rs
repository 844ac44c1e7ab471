use anyhow::{Context, Result};
use std::path::PathBuf;

/// Centralized path management for recap
/// This module provides a single source of truth for all application paths

/// Get the main recap config directory
pub fn recap_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Unable to determine user config directory")?
        .join("recap");

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("creating config directory at {}", config_dir.display()))?;

    Ok(config_dir)
}

/// Default data directory, used when the config does not override it
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| {
            let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
            home.join(".local/share")
        })
        .join("recap")
}

/// Path of the main config file
pub fn recap_config_file() -> Result<PathBuf> {
    Ok(recap_config_dir()?.join("recap.toml"))
}
