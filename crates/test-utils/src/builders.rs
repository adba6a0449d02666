#![allow(dead_code)]

use std::path::Path;

use gwatch::config::{ConfigFile, RawConfigFile};
use gwatch::types::ErrorPolicy;

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from the file defaults; each setter overrides one field.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn root(mut self, root: &str) -> Self {
        self.config.root = Some(root.to_string());
        self
    }

    pub fn log_prefix(mut self, prefix: &str) -> Self {
        self.config.log_prefix = Some(prefix.to_string());
        self
    }

    pub fn paths(mut self, paths: &[&str]) -> Self {
        self.config.watch.paths = to_strings(paths);
        self
    }

    pub fn exts(mut self, exts: &[&str]) -> Self {
        self.config.watch.exts = to_strings(exts);
        self
    }

    pub fn exclude(mut self, patterns: &[&str]) -> Self {
        self.config.watch.exclude = to_strings(patterns);
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.config.watch.recursive = recursive;
        self
    }

    pub fn delay(mut self, delay: &str) -> Self {
        self.config.watch.delay = delay.to_string();
        self
    }

    pub fn on_error(mut self, policy: ErrorPolicy) -> Self {
        self.config.watch.on_error = policy;
        self
    }

    pub fn build_cmd(mut self, cmd: &str) -> Self {
        self.config.build.cmd = cmd.to_string();
        self
    }

    pub fn run_bin(mut self, bin: &str, args: &[&str]) -> Self {
        self.config.run.bin = bin.to_string();
        self.config.run.args = to_strings(args);
        self
    }

    pub fn raw(&self) -> &RawConfigFile {
        &self.config
    }

    /// The TOML text a user would write for this config.
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(&self.config).expect("config serialises")
    }

    /// Validate against `base`, panicking on invalid settings.
    pub fn build(self, base: &Path) -> ConfigFile {
        ConfigFile::from_raw(self.config, base).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
