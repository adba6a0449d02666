// src/fs/mock.rs

//! In-memory [`FileSystem`] used by tests.
//!
//! Paths are stored exactly as given; parents are created implicitly.
//! [`MockFileSystem::deny`] marks a path as unreadable so error paths can be
//! exercised without touching real permissions.

use super::{DirEntry, EntryKind, FileSystem};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir(Vec<String>), // List of child names
    Special,
    Denied,
}

#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.insert(path.as_ref(), MockEntry::File(content.into()));
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut files = self.lock();
        ensure_dir_entry(&mut files, path);
    }

    /// Add a non-regular entry (socket, fifo, ...).
    pub fn add_special(&self, path: impl AsRef<Path>) {
        self.insert(path.as_ref(), MockEntry::Special);
    }

    /// Make every access to `path` fail with `PermissionDenied`.
    pub fn deny(&self, path: impl AsRef<Path>) {
        self.insert(path.as_ref(), MockEntry::Denied);
    }

    fn insert(&self, path: &Path, entry: MockEntry) {
        let mut files = self.lock();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                ensure_dir_entry(&mut files, parent);
                link_child(&mut files, parent, path);
            }
        }
        files.insert(path.to_path_buf(), entry);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, MockEntry>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn ensure_dir_entry(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
    if files.contains_key(path) {
        return;
    }
    files.insert(path.to_path_buf(), MockEntry::Dir(Vec::new()));
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && parent != path {
            ensure_dir_entry(files, parent);
            link_child(files, parent, path);
        }
    }
}

fn link_child(files: &mut HashMap<PathBuf, MockEntry>, parent: &Path, child: &Path) {
    if let Some(MockEntry::Dir(children)) = files.get_mut(parent) {
        if let Some(name) = child.file_name().and_then(|n| n.to_str()) {
            if !children.iter().any(|c| c == name) {
                children.push(name.to_string());
            }
        }
    }
}

fn denied(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("permission denied: {:?}", path),
    )
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let files = self.lock();
        match files.get(path) {
            Some(MockEntry::File(content)) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(MockEntry::Dir(_)) => Err(anyhow!("Is a directory: {:?}", path)),
            Some(MockEntry::Denied) => Err(denied(path).into()),
            Some(MockEntry::Special) => Err(anyhow!("Not a regular file: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    fn stat(&self, path: &Path) -> io::Result<EntryKind> {
        match self.lock().get(path) {
            Some(MockEntry::File(_)) => Ok(EntryKind::File),
            Some(MockEntry::Dir(_)) => Ok(EntryKind::Dir),
            Some(MockEntry::Special) => Ok(EntryKind::Other),
            Some(MockEntry::Denied) => Err(denied(path)),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file or directory: {:?}", path),
            )),
        }
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let files = self.lock();
        let children = match files.get(path) {
            Some(MockEntry::Dir(children)) => children.clone(),
            Some(MockEntry::Denied) => return Err(denied(path).into()),
            _ => return Err(anyhow!("Not a directory or not found: {:?}", path)),
        };

        let mut entries: Vec<DirEntry> = children
            .iter()
            .map(|name| {
                let child = path.join(name);
                let kind = match files.get(&child) {
                    Some(MockEntry::Dir(_)) => EntryKind::Dir,
                    Some(MockEntry::File(_)) => EntryKind::File,
                    // Denied directories still show up as directories in
                    // their parent's listing; reading them is what fails.
                    Some(MockEntry::Denied) => EntryKind::Dir,
                    _ => EntryKind::Other,
                };
                DirEntry { path: child, kind }
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}
