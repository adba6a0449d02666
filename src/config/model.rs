// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::ErrorPolicy;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// root = "."
/// log_prefix = "app"
///
/// [watch]
/// paths = ["."]
/// exts = ["go", "tmpl", "tmp", "html"]
/// exclude = [".git", "bin", "vendor", "testdata"]
/// recursive = true
/// delay = "100ms"
/// on_error = "fatal"
///
/// [build]
/// cmd = "go build -o bin/main ."
///
/// [run]
/// bin = "bin/main"
/// args = []
/// ```
///
/// All sections are optional and have reasonable defaults. This is the raw,
/// unvalidated form; use [`ConfigFile`] everywhere else.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RawConfigFile {
    /// Project root. Relative paths in the file are resolved against it.
    /// Defaults to the directory containing the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,

    /// Prefix for child process output lines. Defaults to the root's basename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_prefix: Option<String>,

    #[serde(default)]
    pub watch: WatchSection,

    #[serde(default)]
    pub build: BuildSection,

    #[serde(default)]
    pub run: RunSection,
}

/// `[watch]` section.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WatchSection {
    /// Root paths to watch.
    #[serde(default = "default_paths")]
    pub paths: Vec<String>,

    /// Extensions (without the leading dot) that trigger a rebuild.
    #[serde(default = "default_exts")]
    pub exts: Vec<String>,

    /// Glob patterns, relative to `root`, for directories never watched.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    /// Whether subdirectories of `paths` are watched too.
    #[serde(default = "default_recursive")]
    pub recursive: bool,

    /// Quiet period used to coalesce bursts of events, e.g. `"100ms"`.
    #[serde(default = "default_delay")]
    pub delay: String,

    /// `"fatal"` (default) or `"log"`.
    #[serde(default)]
    pub on_error: ErrorPolicy,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            paths: default_paths(),
            exts: default_exts(),
            exclude: default_exclude(),
            recursive: default_recursive(),
            delay: default_delay(),
            on_error: ErrorPolicy::default(),
        }
    }
}

/// `[build]` section.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BuildSection {
    /// Build command. Split on whitespace and executed without a shell.
    #[serde(default = "default_build_cmd")]
    pub cmd: String,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            cmd: default_build_cmd(),
        }
    }
}

/// `[run]` section.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RunSection {
    /// Binary produced by the build.
    #[serde(default = "default_run_bin")]
    pub bin: String,

    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            bin: default_run_bin(),
            args: Vec::new(),
        }
    }
}

fn default_paths() -> Vec<String> {
    vec![".".to_string()]
}

fn default_exts() -> Vec<String> {
    ["go", "tmpl", "tmp", "html"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_exclude() -> Vec<String> {
    [".git", "bin", "vendor", "testdata"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_recursive() -> bool {
    true
}

fn default_delay() -> String {
    "100ms".to_string()
}

fn default_build_cmd() -> String {
    format!("go build -o {} .", default_run_bin())
}

fn default_run_bin() -> String {
    if cfg!(windows) {
        "bin/main.exe".to_string()
    } else {
        "bin/main".to_string()
    }
}

/// Validated configuration snapshot.
///
/// Produced by [`ConfigFile::from_raw`] (see `validate.rs`). A reload always
/// produces a new `ConfigFile`; nothing hands out mutable access to a live one.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// Absolute, normalised project root.
    pub root: PathBuf,
    pub log_prefix: String,
    pub watch: WatchConfig,
    pub runner: RunnerConfig,
}

impl ConfigFile {
    /// Settings for the watcher side of a generation.
    pub fn watch_config(&self) -> WatchConfig {
        self.watch.clone()
    }

    /// Settings for the build/run side of a generation.
    pub fn runner_config(&self) -> RunnerConfig {
        self.runner.clone()
    }
}

/// Everything the dispatcher needs to know about what to watch.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchConfig {
    /// Directory that relative exclude patterns are anchored to.
    pub root: PathBuf,
    /// Root paths, absolute and deduplicated, in configuration order.
    pub paths: Vec<PathBuf>,
    /// Watched extensions without a leading dot.
    pub exts: Vec<String>,
    pub exclude: Vec<String>,
    pub recursive: bool,
    pub delay: Duration,
    pub on_error: ErrorPolicy,
}

impl WatchConfig {
    /// Minimal config watching `paths` for `exts`, anchored at `root`.
    ///
    /// Non-recursive, no exclusions, no delay, fatal error policy.
    pub fn new(
        root: impl Into<PathBuf>,
        paths: Vec<PathBuf>,
        exts: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            root: root.into(),
            paths,
            exts: exts.into_iter().map(Into::into).collect(),
            exclude: Vec::new(),
            recursive: false,
            delay: Duration::ZERO,
            on_error: ErrorPolicy::Fatal,
        }
    }

    pub fn with_exclude(mut self, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.exclude = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }

    /// Short label for the root, used in console output.
    pub fn root_label(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.display().to_string())
    }

    /// True if `ext` (without dot) is one of the watched extensions.
    pub fn watches_ext(&self, ext: &str) -> bool {
        self.exts.iter().any(|e| e == ext)
    }
}

/// Build and run commands for a generation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// Working directory for both commands (the project root).
    pub dir: PathBuf,
    /// Build command as an argument vector.
    pub build: Vec<String>,
    /// Binary followed by its arguments.
    pub run: Vec<String>,
    /// Prefix for child output lines.
    pub log_prefix: String,
}
