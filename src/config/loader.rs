// src/config/loader.rs

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{GwatchError, Result};
use crate::fs::{FileSystem, RealFileSystem};

/// Default config file name, looked up in the current working directory.
pub const DEFAULT_CONFIG_FILE: &str = "Gwatch.toml";

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(fs: &dyn FileSystem, path: &Path) -> Result<RawConfigFile> {
    let contents = fs.read_to_string(path)?;
    let config: RawConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// Relative paths inside the file are resolved against the file's directory
/// (see [`config_base_dir`]).
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let raw = load_from_path(&RealFileSystem, path)?;
    ConfigFile::from_raw(raw, &config_base_dir(path)?)
}

/// Load the config at `path`, first writing a file with the defaults if none
/// exists yet.
///
/// Calling this again after the file changed is how a reload is done: every
/// call returns a fresh, independent snapshot.
pub fn load_or_init(fs: &dyn FileSystem, path: &Path, base: &Path) -> Result<ConfigFile> {
    if !fs.exists(path) {
        write_default_config(fs, path)?;
        info!(path = ?path, "no config file found; wrote defaults");
    }

    let raw = load_from_path(fs, path)?;
    debug!(path = ?path, "config loaded");
    ConfigFile::from_raw(raw, base)
}

/// Re-read the config at `path` after it changed.
///
/// Unlike [`load_or_init`], a missing file is an error here: a config that
/// disappears mid-session is not silently replaced with defaults.
pub fn reload(fs: &dyn FileSystem, path: &Path, base: &Path) -> Result<ConfigFile> {
    let raw = load_from_path(fs, path)?;
    debug!(path = ?path, "config reloaded");
    ConfigFile::from_raw(raw, base)
}

/// Write a config file containing all defaults.
pub fn write_default_config(fs: &dyn FileSystem, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(&RawConfigFile::default())?;
    fs.write(path, contents.as_bytes())?;
    Ok(())
}

/// Directory that relative paths in the config at `path` are resolved
/// against.
///
/// - If the config path has a non-empty parent (e.g. "configs/Gwatch.toml"),
///   that directory is used, made absolute against the working directory.
/// - If it's just a bare filename like "Gwatch.toml" (parent = ""),
///   we fall back to the current working directory.
pub fn config_base_dir(path: &Path) -> Result<PathBuf> {
    let cwd = std::env::current_dir().map_err(|e| {
        GwatchError::config(format!("cannot determine working directory: {e}"))
    })?;

    Ok(match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            if parent.is_absolute() {
                parent.to_path_buf()
            } else {
                cwd.join(parent)
            }
        }
        _ => cwd,
    })
}

/// Helper to resolve a default config path.
pub fn default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_FILE)
}
