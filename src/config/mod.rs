// src/config/mod.rs

//! Configuration loading and validation for gwatch.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load, initialise and reload a config file (`loader.rs`).
//! - Validate values and resolve paths (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{
    config_base_dir, default_config_path, load_and_validate, load_from_path, load_or_init,
    reload, write_default_config, DEFAULT_CONFIG_FILE,
};
pub use model::{
    BuildSection, ConfigFile, RawConfigFile, RunSection, RunnerConfig, WatchConfig, WatchSection,
};
