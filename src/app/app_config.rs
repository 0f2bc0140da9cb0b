//! Locating and loading the config file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use media_ingest_core::IngestConfig;
use tracing::debug;

/// Default config file location, in priority order:
///
/// 1. `$XDG_CONFIG_HOME/media-ingest/config.toml`
/// 2. `$HOME/.config/media-ingest/config.toml`
#[must_use]
pub(crate) fn resolve_default_config_path() -> Option<PathBuf> {
    default_config_path_from(
        env_var_non_empty_os("XDG_CONFIG_HOME"),
        env_var_non_empty_os("HOME"),
    )
}

fn default_config_path_from(xdg_config_home: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    if let Some(xdg) = xdg_config_home {
        return Some(PathBuf::from(xdg).join("media-ingest").join("config.toml"));
    }
    let home = home?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("media-ingest")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = std::env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the explicit config file, else the default one if it exists,
/// else built-in defaults.
pub(crate) fn load_config(explicit: Option<&Path>) -> Result<IngestConfig> {
    if let Some(path) = explicit {
        return IngestConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()));
    }
    match resolve_default_config_path() {
        Some(path) if path.exists() => IngestConfig::load(&path)
            .with_context(|| format!("loading config from {}", path.display())),
        _ => {
            debug!("no config file, using defaults");
            Ok(IngestConfig::default())
        }
    }
}
