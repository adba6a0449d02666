// src/watch/paths.rs

//! Expansion of configured root paths into the concrete directory list
//! handed to the OS watcher.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::debug;

use crate::config::WatchConfig;
use crate::errors::{GwatchError, Result};
use crate::fs::{EntryKind, FileSystem};
use crate::watch::path_utils::normalize_path;

/// Compiled exclusion patterns, anchored at the project root.
///
/// A relative pattern such as `"vendor"` or `"web/*/node_modules"` is joined
/// onto the root and matched against full directory paths. `*` never crosses
/// a path separator.
#[derive(Clone)]
pub struct ExcludeMatcher {
    set: GlobSet,
    patterns: Vec<String>,
}

impl fmt::Debug for ExcludeMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExcludeMatcher")
            .field("patterns", &self.patterns)
            .finish_non_exhaustive()
    }
}

impl ExcludeMatcher {
    pub fn new(root: &Path, patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut anchored = Vec::with_capacity(patterns.len());

        for pattern in patterns {
            let full = anchor_pattern(root, pattern);
            let glob = GlobBuilder::new(&full)
                .literal_separator(true)
                .build()
                .map_err(|e| {
                    GwatchError::config(format!("invalid exclude pattern '{pattern}': {e}"))
                })?;
            builder.add(glob);
            anchored.push(full);
        }

        Ok(Self {
            set: builder.build()?,
            patterns: anchored,
        })
    }

    /// True if `dir` itself matches one of the patterns.
    pub fn is_excluded(&self, dir: &Path) -> bool {
        !self.patterns.is_empty() && self.set.is_match(dir)
    }

    /// True if `path` or any of its ancestors matches one of the patterns.
    pub fn is_within_excluded(&self, path: &Path) -> bool {
        !self.patterns.is_empty() && path.ancestors().any(|p| self.set.is_match(p))
    }
}

fn anchor_pattern(root: &Path, pattern: &str) -> String {
    let pattern = pattern.trim();
    if Path::new(pattern).is_absolute() {
        return pattern.to_string();
    }

    let root = normalize_path(root).to_string_lossy().into_owned();
    let root = globset::escape(&root);
    let pattern = pattern.trim_start_matches("./");
    if root.ends_with('/') || root.ends_with('\\') {
        format!("{root}{pattern}")
    } else {
        format!("{root}{}{pattern}", std::path::MAIN_SEPARATOR)
    }
}

/// The concrete, deduplicated, exclusion-pruned set of paths to watch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPathSet {
    paths: Vec<PathBuf>,
}

impl ResolvedPathSet {
    /// Build a set from explicit paths, dropping duplicates.
    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut out: Vec<PathBuf> = Vec::new();
        for p in paths {
            if !out.contains(&p) {
                out.push(p);
            }
        }
        Self { paths: out }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.paths.iter()
    }
}

/// Resolve the full list of paths to register with the watcher.
///
/// Every root is always part of the result. When `recursive` is set, each
/// root directory is walked depth-first; a directory matching an exclude
/// pattern is skipped together with its whole subtree. Any filesystem error
/// during the walk aborts resolution: a partially watched tree is worse than
/// a clear failure.
pub fn resolve_path_set(fs: &dyn FileSystem, cfg: &WatchConfig) -> Result<ResolvedPathSet> {
    let exclude = ExcludeMatcher::new(&cfg.root, &cfg.exclude)?;
    resolve_with(fs, cfg, &exclude)
}

pub(crate) fn resolve_with(
    fs: &dyn FileSystem,
    cfg: &WatchConfig,
    exclude: &ExcludeMatcher,
) -> Result<ResolvedPathSet> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut paths = Vec::new();

    for root in &cfg.paths {
        let root = normalize_path(root);
        let kind = fs.stat(&root).map_err(|e| GwatchError::PathWalk {
            path: root.clone(),
            source: e.into(),
        })?;

        if seen.insert(root.clone()) {
            paths.push(root.clone());
        }

        if !cfg.recursive || kind != EntryKind::Dir {
            continue;
        }

        if exclude.is_excluded(&root) {
            debug!(path = ?root, "watch root matches an exclude pattern; not descending");
            continue;
        }

        walk(fs, &root, exclude, &mut seen, &mut paths)?;
    }

    debug!(count = paths.len(), "resolved watch paths");
    Ok(ResolvedPathSet { paths })
}

fn walk(
    fs: &dyn FileSystem,
    root: &Path,
    exclude: &ExcludeMatcher,
    seen: &mut HashSet<PathBuf>,
    paths: &mut Vec<PathBuf>,
) -> Result<()> {
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        if dir != root {
            if !seen.insert(dir.clone()) {
                // Already covered by an overlapping root.
                continue;
            }
            paths.push(dir.clone());
        }

        let entries = fs.list_dir(&dir).map_err(|source| GwatchError::PathWalk {
            path: dir.clone(),
            source,
        })?;

        let mut children = Vec::new();
        for entry in entries {
            if entry.kind != EntryKind::Dir {
                continue;
            }
            if exclude.is_excluded(&entry.path) {
                debug!(path = ?entry.path, "excluded directory pruned");
                continue;
            }
            children.push(entry.path);
        }

        // Reverse so the stack pops children in listing order.
        stack.extend(children.into_iter().rev());
    }

    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn tree() -> MockFileSystem {
        let fs = MockFileSystem::new();
        fs.add_file("/proj/main.go", "package main");
        fs.add_file("/proj/pkg/a/a.go", "package a");
        fs.add_file("/proj/pkg/b/b.go", "package b");
        fs.add_file("/proj/vendor/lib/lib.go", "package lib");
        fs.add_file("/proj/.git/objects/aa", "blob");
        fs.add_file("/proj/web/node_modules/x/index.js", "");
        fs.add_file("/proj/web/src/app.html", "");
        fs
    }

    fn cfg(exclude: &[&str], recursive: bool) -> WatchConfig {
        WatchConfig::new("/proj", vec![PathBuf::from("/proj")], ["go"])
            .with_exclude(exclude.iter().copied())
            .with_recursive(recursive)
    }

    fn strs(set: &ResolvedPathSet) -> Vec<String> {
        set.iter().map(|p| p.display().to_string()).collect()
    }

    #[test]
    fn non_recursive_returns_roots_only() {
        let set = resolve_path_set(&tree(), &cfg(&[], false)).unwrap();
        assert_eq!(strs(&set), vec!["/proj"]);
    }

    #[test]
    fn recursive_walk_is_depth_first_and_prunes_excluded_subtrees() {
        let set = resolve_path_set(&tree(), &cfg(&[".git", "vendor"], true)).unwrap();
        assert_eq!(
            strs(&set),
            vec![
                "/proj",
                "/proj/pkg",
                "/proj/pkg/a",
                "/proj/pkg/b",
                "/proj/web",
                "/proj/web/node_modules",
                "/proj/web/node_modules/x",
                "/proj/web/src",
            ]
        );
        assert!(!set.contains(Path::new("/proj/vendor/lib")));
        assert!(!set.contains(Path::new("/proj/.git/objects")));
    }

    #[test]
    fn wildcard_does_not_cross_separators() {
        let set = resolve_path_set(&tree(), &cfg(&["*/node_modules"], true)).unwrap();
        assert!(!set.contains(Path::new("/proj/web/node_modules")));
        assert!(!set.contains(Path::new("/proj/web/node_modules/x")));
        assert!(set.contains(Path::new("/proj/web/src")));

        // A bare "node_modules" only matches directly under the root.
        let set = resolve_path_set(&tree(), &cfg(&["node_modules"], true)).unwrap();
        assert!(set.contains(Path::new("/proj/web/node_modules")));
    }

    #[test]
    fn overlapping_roots_are_deduplicated() {
        let config = WatchConfig::new(
            "/proj",
            vec![PathBuf::from("/proj"), PathBuf::from("/proj/pkg")],
            ["go"],
        )
        .with_recursive(true)
        .with_exclude([".git", "vendor", "web"]);

        let set = resolve_path_set(&tree(), &config).unwrap();
        assert_eq!(
            strs(&set),
            vec!["/proj", "/proj/pkg", "/proj/pkg/a", "/proj/pkg/b"]
        );
    }

    #[test]
    fn unreadable_directory_aborts_resolution() {
        let fs = tree();
        fs.deny("/proj/pkg/secret");

        let err = resolve_path_set(&fs, &cfg(&[], true)).unwrap_err();
        match err {
            GwatchError::PathWalk { path, .. } => assert_eq!(path, PathBuf::from("/proj/pkg/secret")),
            other => panic!("expected PathWalk error, got {other:?}"),
        }
    }

    #[test]
    fn excluded_unreadable_directory_is_never_read() {
        let fs = tree();
        fs.deny("/proj/pkg/secret");

        let set = resolve_path_set(&fs, &cfg(&["pkg/secret"], true)).unwrap();
        assert!(!set.contains(Path::new("/proj/pkg/secret")));
    }

    #[test]
    fn missing_root_is_an_error() {
        let config = WatchConfig::new("/proj", vec![PathBuf::from("/nope")], ["go"]);
        assert!(matches!(
            resolve_path_set(&tree(), &config),
            Err(GwatchError::PathWalk { .. })
        ));
    }

    #[test]
    fn file_roots_are_kept_but_not_walked() {
        let config = WatchConfig::new("/proj", vec![PathBuf::from("/proj/main.go")], ["go"])
            .with_recursive(true);
        let set = resolve_path_set(&tree(), &config).unwrap();
        assert_eq!(strs(&set), vec!["/proj/main.go"]);
    }

    #[test]
    fn within_excluded_checks_every_ancestor() {
        let m = ExcludeMatcher::new(Path::new("/proj"), &["vendor".to_string()]).unwrap();
        assert!(m.is_within_excluded(Path::new("/proj/vendor/lib/deep/x.go")));
        assert!(!m.is_within_excluded(Path::new("/proj/src/vendor.go")));

        let none = ExcludeMatcher::new(Path::new("/proj"), &[]).unwrap();
        assert!(!none.is_within_excluded(Path::new("/proj/vendor/x.go")));
    }
}
