// src/watch/collector.rs

//! Thin wrapper around the OS notification primitive (`notify`).
//!
//! The collector turns raw `notify` callbacks into two plain streams: one of
//! [`ChangeEvent`]s, one of errors. It performs no filtering, reordering or
//! deduplication; that is the dispatcher's job.

use std::path::PathBuf;

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::errors::{GwatchError, Result};
use crate::types::ChangeKind;
use crate::watch::paths::ResolvedPathSet;

/// A single filesystem change: what happened, and to which path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Receiving side of an open collector.
///
/// Both streams end once the collector is closed (or dropped).
#[derive(Debug)]
pub struct ChangeStreams {
    pub events: mpsc::UnboundedReceiver<ChangeEvent>,
    pub errors: mpsc::UnboundedReceiver<GwatchError>,
}

/// Sending side matching [`ChangeStreams`].
#[derive(Debug, Clone)]
pub(crate) struct ChangeSenders {
    pub events: mpsc::UnboundedSender<ChangeEvent>,
    pub errors: mpsc::UnboundedSender<GwatchError>,
}

pub(crate) fn change_channel() -> (ChangeSenders, ChangeStreams) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (errors_tx, errors_rx) = mpsc::unbounded_channel();
    (
        ChangeSenders {
            events: events_tx,
            errors: errors_tx,
        },
        ChangeStreams {
            events: events_rx,
            errors: errors_rx,
        },
    )
}

/// Handle owning the OS watch registrations.
pub struct ChangeCollector {
    watcher: Option<RecommendedWatcher>,
}

impl std::fmt::Debug for ChangeCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeCollector")
            .field("open", &self.watcher.is_some())
            .finish()
    }
}

impl ChangeCollector {
    /// Register every path in `paths` (non-recursively; the resolver already
    /// expanded subdirectories) and start delivering changes.
    ///
    /// All-or-nothing: if any path cannot be added, the partially set up
    /// watcher is dropped and the error returned.
    pub fn open(paths: &ResolvedPathSet) -> Result<(Self, ChangeStreams)> {
        let (senders, streams) = change_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                // Send errors only mean the dispatcher is gone; nothing to do.
                Ok(event) => {
                    for change in split_event(event) {
                        let _ = senders.events.send(change);
                    }
                }
                Err(err) => {
                    let _ = senders.errors.send(GwatchError::from(err));
                }
            },
            Config::default(),
        )?;

        for path in paths.iter() {
            watcher.watch(path, RecursiveMode::NonRecursive)?;
            debug!(path = ?path, "watch registered");
        }

        info!(count = paths.len(), "file watcher armed");

        Ok((
            Self {
                watcher: Some(watcher),
            },
            streams,
        ))
    }

    /// Stop delivery and release the OS watch handles. Idempotent.
    pub fn close(&mut self) {
        if self.watcher.take().is_some() {
            debug!("file watcher closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.watcher.is_some()
    }
}

/// Flatten one `notify` event into per-path change events, preserving order.
pub(crate) fn split_event(event: Event) -> Vec<ChangeEvent> {
    if let EventKind::Modify(ModifyKind::Name(RenameMode::Both)) = event.kind {
        // [from, to]: the old name went away, the new one appeared.
        let mut paths = event.paths.into_iter();
        let mut out = Vec::with_capacity(2);
        if let Some(from) = paths.next() {
            out.push(ChangeEvent::new(ChangeKind::Rename, from));
        }
        out.extend(paths.map(|to| ChangeEvent::new(ChangeKind::Create, to)));
        return out;
    }

    match ChangeKind::from_notify(&event.kind) {
        Some(kind) => event
            .paths
            .into_iter()
            .map(|path| ChangeEvent::new(kind, path))
            .collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange};

    #[test]
    fn rename_both_splits_into_rename_and_create() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/p/old.go"))
            .add_path(PathBuf::from("/p/new.go"));

        assert_eq!(
            split_event(event),
            vec![
                ChangeEvent::new(ChangeKind::Rename, "/p/old.go"),
                ChangeEvent::new(ChangeKind::Create, "/p/new.go"),
            ]
        );
    }

    #[test]
    fn multi_path_events_keep_order() {
        let event = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Any)))
            .add_path(PathBuf::from("/p/a.go"))
            .add_path(PathBuf::from("/p/b.go"));

        let kinds: Vec<_> = split_event(event).into_iter().map(|e| e.path).collect();
        assert_eq!(kinds, vec![PathBuf::from("/p/a.go"), PathBuf::from("/p/b.go")]);

        let created = Event::new(EventKind::Create(CreateKind::File)).add_path("/p/c.go".into());
        assert_eq!(split_event(created)[0].kind, ChangeKind::Create);
    }

    #[test]
    fn access_events_are_dropped() {
        let event = Event::new(EventKind::Access(AccessKind::Any)).add_path("/p/a.go".into());
        assert!(split_event(event).is_empty());
    }

    #[tokio::test]
    async fn open_fails_for_missing_path_and_close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();

        let missing = ResolvedPathSet::from_paths(vec![dir.path().join("does-not-exist")]);
        assert!(ChangeCollector::open(&missing).is_err());

        let ok = ResolvedPathSet::from_paths(vec![dir.path().to_path_buf()]);
        let (mut collector, mut streams) = ChangeCollector::open(&ok).unwrap();
        assert!(collector.is_open());
        collector.close();
        collector.close();
        assert!(!collector.is_open());

        // Both streams end once the watcher is gone.
        let ended = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while streams.events.recv().await.is_some() {}
            while streams.errors.recv().await.is_some() {}
        })
        .await;
        assert!(ended.is_ok());
    }
}
