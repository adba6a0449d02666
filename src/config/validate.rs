// src/config/validate.rs

use std::path::{Path, PathBuf};

use globset::Glob;

use crate::config::model::{ConfigFile, RawConfigFile, RunnerConfig, WatchConfig};
use crate::errors::{GwatchError, Result};
use crate::types::parse_duration;
use crate::watch::path_utils::normalize_path;

impl ConfigFile {
    /// Validate a raw config and resolve every relative path against `base`
    /// (normally the directory holding the config file).
    pub fn from_raw(raw: RawConfigFile, base: &Path) -> Result<Self> {
        let root = match raw.root.as_deref() {
            Some(r) if !r.trim().is_empty() => resolve(base, r),
            _ => normalize_path(base),
        };

        let watch = validate_watch(&raw, &root)?;
        let log_prefix = match raw.log_prefix.clone() {
            Some(prefix) => prefix,
            None => watch.root_label(),
        };
        let runner = validate_runner(&raw, &root, &log_prefix)?;

        Ok(ConfigFile {
            root,
            log_prefix,
            watch,
            runner,
        })
    }
}

fn validate_watch(raw: &RawConfigFile, root: &Path) -> Result<WatchConfig> {
    let section = &raw.watch;

    if section.paths.is_empty() {
        return Err(GwatchError::config("[watch].paths must not be empty"));
    }

    let mut paths: Vec<PathBuf> = Vec::with_capacity(section.paths.len());
    for p in &section.paths {
        if p.trim().is_empty() {
            return Err(GwatchError::config("[watch].paths contains an empty path"));
        }
        let resolved = resolve(root, p);
        if !paths.contains(&resolved) {
            paths.push(resolved);
        }
    }

    let mut exts: Vec<String> = Vec::with_capacity(section.exts.len());
    for ext in &section.exts {
        let ext = ext.trim().trim_start_matches('.');
        if ext.is_empty() {
            return Err(GwatchError::config("[watch].exts contains an empty extension"));
        }
        if !exts.iter().any(|e| e == ext) {
            exts.push(ext.to_string());
        }
    }
    if exts.is_empty() {
        return Err(GwatchError::config("[watch].exts must not be empty"));
    }

    for pattern in &section.exclude {
        Glob::new(pattern).map_err(|e| {
            GwatchError::config(format!("[watch].exclude has invalid pattern '{pattern}': {e}"))
        })?;
    }

    let delay = parse_duration(&section.delay)
        .map_err(|e| GwatchError::config(format!("[watch].delay: {e}")))?;

    Ok(WatchConfig {
        root: root.to_path_buf(),
        paths,
        exts,
        exclude: section.exclude.clone(),
        recursive: section.recursive,
        delay,
        on_error: section.on_error,
    })
}

fn validate_runner(raw: &RawConfigFile, root: &Path, log_prefix: &str) -> Result<RunnerConfig> {
    let build: Vec<String> = raw
        .build
        .cmd
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if build.is_empty() {
        return Err(GwatchError::config("[build].cmd must not be empty"));
    }

    let bin = raw.run.bin.trim();
    if bin.is_empty() {
        return Err(GwatchError::config("[run].bin must not be empty"));
    }

    let mut run = Vec::with_capacity(raw.run.args.len() + 1);
    run.push(resolve(root, bin).to_string_lossy().into_owned());
    run.extend(raw.run.args.iter().cloned());

    Ok(RunnerConfig {
        dir: root.to_path_buf(),
        build,
        run,
        log_prefix: log_prefix.to_string(),
    })
}

fn resolve(base: &Path, p: &str) -> PathBuf {
    let p = Path::new(p.trim());
    if p.is_absolute() {
        normalize_path(p)
    } else {
        normalize_path(&base.join(p))
    }
}
