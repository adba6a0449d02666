// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Expanding configured roots into the directories to watch (`paths`).
//! - Wrapping the cross-platform watcher (`notify`) as plain event and error
//!   streams (`collector`).
//! - Filtering, coalescing and dispatching those events to handlers
//!   (`debounce`, `dispatcher`).
//!
//! It does **not** know about builds or processes; handlers decide what a
//! change means.

pub mod collector;
pub mod debounce;
pub mod dispatcher;
pub mod path_utils;
pub mod paths;

pub use collector::{ChangeCollector, ChangeEvent, ChangeStreams};
pub use debounce::Debouncer;
pub use dispatcher::{
    event_handler, Dispatcher, DispatcherBuilder, DispatcherCloser,
    ErrorHandler, EventHandler, HandlerFuture, ResolvedWatchConfig,
};
pub use paths::{resolve_path_set, ExcludeMatcher, ResolvedPathSet};
