// src/watch/dispatcher.rs

//! Debounced dispatcher: filters collector output and fires handlers.
//!
//! Handlers are registered on a [`DispatcherBuilder`]; `build` freezes the
//! handler table, resolves the watch set and opens the collector. The
//! resulting [`Dispatcher`] only exposes `listen`, so the table cannot change
//! once events are flowing.
//!
//! Per event, the loop:
//! 1. drops it if no handler is registered for its kind;
//! 2. drops it unless it names a regular file with a watched extension
//!    outside every excluded directory;
//! 3. records it (with the last handler registered for its kind) as the
//!    pending trigger and restarts the quiet period.
//!
//! When the quiet period elapses the single pending handler is spawned with
//! the single pending event. Whatever happened in between is coalesced:
//! last writer wins, across kinds and handlers.
//!
//! Errors (collector errors and failed `stat`s) go to the registered error
//! handler. Without one, the config's [`ErrorPolicy`] applies: `Log` keeps
//! listening, `Fatal` ends `listen` with the error so the caller can tear
//! down its processes before exiting.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::config::WatchConfig;
use crate::errors::{GwatchError, Result};
use crate::fs::{EntryKind, FileSystem, RealFileSystem};
use crate::types::{ChangeKind, ErrorPolicy};
use crate::watch::collector::{ChangeCollector, ChangeEvent, ChangeStreams};
use crate::watch::debounce::Debouncer;
use crate::watch::path_utils::{display_path, extension_of, relative_str};
use crate::watch::paths::{resolve_with, ExcludeMatcher, ResolvedPathSet};

/// Future returned by an event handler. Handlers run on their own task.
pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Callback invoked with the debounced event.
pub type EventHandler = Arc<dyn Fn(ChangeEvent) -> HandlerFuture + Send + Sync>;

/// Callback invoked for watch errors once listening has started.
pub type ErrorHandler = Arc<dyn Fn(GwatchError) + Send + Sync>;

/// Wrap an async closure as an [`EventHandler`].
pub fn event_handler<F, Fut>(f: F) -> EventHandler
where
    F: Fn(ChangeEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)) as HandlerFuture)
}

/// Where errors seen while listening end up.
#[derive(Clone)]
enum ErrorRoute {
    Handler(ErrorHandler),
    Policy(ErrorPolicy),
}

impl ErrorRoute {
    /// Deliver `err`. Returns it back when listening must stop.
    fn report(&self, err: GwatchError) -> Result<()> {
        match self {
            ErrorRoute::Handler(handler) => {
                handler(err);
                Ok(())
            }
            ErrorRoute::Policy(ErrorPolicy::Log) => {
                warn!(error = %err, "watcher error");
                Ok(())
            }
            ErrorRoute::Policy(ErrorPolicy::Fatal) => {
                error!(error = %err, "watcher error; stopping");
                Err(err)
            }
        }
    }
}

/// Watch configuration together with the concrete path set it resolved to.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedWatchConfig {
    pub config: WatchConfig,
    pub paths: ResolvedPathSet,
}

impl ResolvedWatchConfig {
    /// The configured roots, as shown to the user.
    pub fn root_paths(&self) -> Vec<String> {
        self.config
            .paths
            .iter()
            .map(|p| match relative_str(&self.config.root, p) {
                Some(rel) if rel.is_empty() => ".".to_string(),
                Some(rel) => rel,
                None => p.display().to_string(),
            })
            .collect()
    }

    pub fn exts(&self) -> &[String] {
        &self.config.exts
    }
}

/// Build-once table of handlers keyed by change kind.
#[derive(Default, Clone)]
struct HandlerTable {
    handlers: HashMap<ChangeKind, Vec<EventHandler>>,
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<_, _> = self.handlers.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("HandlerTable").field("handlers", &counts).finish()
    }
}

impl HandlerTable {
    /// The handler a qualifying event of `kind` would be paired with.
    fn handler_for(&self, kind: ChangeKind) -> Option<&EventHandler> {
        self.handlers.get(&kind).and_then(|hs| hs.last())
    }
}

/// Collects handlers before the dispatcher is built.
pub struct DispatcherBuilder {
    config: WatchConfig,
    fs: Arc<dyn FileSystem>,
    table: HandlerTable,
    error_handler: Option<ErrorHandler>,
}

impl fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("config", &self.config)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl DispatcherBuilder {
    pub fn new(config: WatchConfig) -> Self {
        Self {
            config,
            fs: Arc::new(RealFileSystem),
            table: HandlerTable::default(),
            error_handler: None,
        }
    }

    /// Use a different filesystem for path resolution and file checks.
    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Append a handler for `kind`.
    pub fn on_event(mut self, kind: ChangeKind, handler: EventHandler) -> Self {
        self.table.handlers.entry(kind).or_default().push(handler);
        self
    }

    /// Replace the error handler. Without one, the config's
    /// [`ErrorPolicy`] decides.
    pub fn on_error(mut self, handler: ErrorHandler) -> Self {
        self.error_handler = Some(handler);
        self
    }

    /// Resolve the watch set, arm the OS watcher and freeze the handler table.
    ///
    /// Resolution and registration errors are returned here, synchronously.
    pub fn build(self) -> Result<Dispatcher> {
        let exclude = ExcludeMatcher::new(&self.config.root, &self.config.exclude)?;
        let paths = resolve_with(self.fs.as_ref(), &self.config, &exclude)?;
        let (collector, streams) = ChangeCollector::open(&paths)?;
        Ok(self.assemble(exclude, paths, Some(collector), streams))
    }

    /// Build a dispatcher fed by externally supplied streams.
    #[cfg(test)]
    pub(crate) fn build_with_streams(
        self,
        paths: ResolvedPathSet,
        streams: ChangeStreams,
    ) -> Result<Dispatcher> {
        let exclude = ExcludeMatcher::new(&self.config.root, &self.config.exclude)?;
        Ok(self.assemble(exclude, paths, None, streams))
    }

    fn assemble(
        self,
        exclude: ExcludeMatcher,
        paths: ResolvedPathSet,
        collector: Option<ChangeCollector>,
        streams: ChangeStreams,
    ) -> Dispatcher {
        let errors = match self.error_handler {
            Some(handler) => ErrorRoute::Handler(handler),
            None => ErrorRoute::Policy(self.config.on_error),
        };
        let (shutdown_tx, _) = watch::channel(false);

        Dispatcher {
            resolved: Arc::new(ResolvedWatchConfig {
                config: self.config,
                paths,
            }),
            filter: EventFilter {
                exclude,
                fs: self.fs,
            },
            table: Arc::new(self.table),
            errors,
            collector,
            streams,
            closer: DispatcherCloser {
                tx: Arc::new(shutdown_tx),
            },
        }
    }
}

/// Cloneable handle that stops a dispatcher's `listen` loop.
#[derive(Debug, Clone)]
pub struct DispatcherCloser {
    tx: Arc<watch::Sender<bool>>,
}

impl DispatcherCloser {
    /// Ask the dispatcher to stop. Safe to call any number of times, before
    /// or after `listen` started or returned.
    pub fn close(&self) {
        if !self.tx.send_replace(true) {
            debug!("dispatcher close requested");
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }
}

#[derive(Debug)]
struct EventFilter {
    exclude: ExcludeMatcher,
    fs: Arc<dyn FileSystem>,
}

impl EventFilter {
    /// Whether `path` is a regular file we care about.
    ///
    /// Any stat failure, including a path that vanished before it could be
    /// checked, is an error for the error handler.
    fn qualifies(&self, config: &WatchConfig, path: &Path) -> Result<bool> {
        match extension_of(path) {
            Some(ext) if config.watches_ext(ext) => {}
            _ => return Ok(false),
        }

        if self.exclude.is_within_excluded(path) {
            return Ok(false);
        }

        match self.fs.stat(path) {
            Ok(EntryKind::File) => Ok(true),
            Ok(_) => Ok(false),
            Err(e) => Err(GwatchError::PathWalk {
                path: path.to_path_buf(),
                source: e.into(),
            }),
        }
    }
}

/// A frozen dispatcher, ready to `listen`.
pub struct Dispatcher {
    resolved: Arc<ResolvedWatchConfig>,
    filter: EventFilter,
    table: Arc<HandlerTable>,
    errors: ErrorRoute,
    collector: Option<ChangeCollector>,
    streams: ChangeStreams,
    closer: DispatcherCloser,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("resolved", &self.resolved)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

type Pending = (ChangeEvent, EventHandler);

impl Dispatcher {
    pub fn builder(config: WatchConfig) -> DispatcherBuilder {
        DispatcherBuilder::new(config)
    }

    pub fn closer(&self) -> DispatcherCloser {
        self.closer.clone()
    }

    pub fn resolved(&self) -> &ResolvedWatchConfig {
        &self.resolved
    }

    /// Listen without a ready callback. See [`Dispatcher::listen_with`].
    pub async fn listen(self) -> Result<()> {
        self.listen_with(|_| async {}).await
    }

    /// Run the dispatch loop until closed or until the collector's streams
    /// end.
    ///
    /// `on_ready` is spawned once, right away, with the resolved config; use
    /// it to kick off work without waiting for a real change.
    ///
    /// Returns `Err` only when an error hits the `Fatal` policy.
    pub async fn listen_with<F, Fut>(self, on_ready: F) -> Result<()>
    where
        F: FnOnce(Arc<ResolvedWatchConfig>) -> Fut + Send,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let Dispatcher {
            resolved,
            filter,
            table,
            errors,
            mut collector,
            mut streams,
            closer,
        } = self;

        let mut shutdown_rx = closer.tx.subscribe();
        let closed = async move {
            // An error means every sender is gone, which also means "stop".
            let _ = shutdown_rx.wait_for(|closed| *closed).await;
        };
        tokio::pin!(closed);

        tokio::spawn(on_ready(Arc::clone(&resolved)));

        let config = &resolved.config;
        let mut debouncer: Debouncer<Pending> = Debouncer::new(config.delay);
        info!(
            paths = resolved.paths.len(),
            delay_ms = config.delay.as_millis() as u64,
            "dispatcher listening"
        );

        let mut outcome = Ok(());
        loop {
            let deadline = debouncer.deadline();

            tokio::select! {
                biased;

                _ = &mut closed => {
                    debug!("dispatcher closed");
                    break;
                }

                maybe_err = streams.errors.recv() => match maybe_err {
                    Some(err) => {
                        if let Err(fatal) = errors.report(err) {
                            outcome = Err(fatal);
                            break;
                        }
                    }
                    None => {
                        debug!("collector error stream ended");
                        break;
                    }
                },

                maybe_event = streams.events.recv() => match maybe_event {
                    Some(event) => {
                        let accepted = accept(event, config, &filter, &table, &mut debouncer);
                        if let Err(fatal) = accepted.or_else(|err| errors.report(err)) {
                            outcome = Err(fatal);
                            break;
                        }
                    }
                    None => {
                        debug!("collector event stream ended");
                        break;
                    }
                },

                _ = sleep_until_opt(deadline) => {
                    if let Some((event, handler)) = debouncer.take_due(Instant::now()) {
                        debug!(
                            kind = %event.kind,
                            path = %display_path(&config.root, &event.path),
                            "debounced event fired"
                        );
                        tokio::spawn(handler(event));
                    }
                }
            }
        }

        debouncer.clear();
        if let Some(collector) = collector.as_mut() {
            collector.close();
        }
        info!("dispatcher stopped");
        outcome
    }
}

fn accept(
    event: ChangeEvent,
    config: &WatchConfig,
    filter: &EventFilter,
    table: &HandlerTable,
    debouncer: &mut Debouncer<Pending>,
) -> Result<()> {
    let Some(handler) = table.handler_for(event.kind) else {
        trace!(kind = %event.kind, path = ?event.path, "no handler for event kind");
        return Ok(());
    };

    if filter.qualifies(config, &event.path)? {
        trace!(kind = %event.kind, path = ?event.path, "event queued");
        debouncer.push((event, Arc::clone(handler)), Instant::now());
    } else {
        trace!(kind = %event.kind, path = ?event.path, "event filtered out");
    }
    Ok(())
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
