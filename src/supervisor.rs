// src/supervisor.rs

//! One generation of the watch → build → run loop.
//!
//! A [`Supervisor`] pairs a dispatcher with a runner: every debounced write
//! to a watched file triggers `Runner::launch`, and so does the dispatcher
//! becoming ready. A [`SupervisorHandle`] tears the generation down.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::WatchConfig;
use crate::errors::Result;
use crate::exec::{ConsoleSink, Runner, SharedSink};
use crate::types::ChangeKind;
use crate::watch::{event_handler, Dispatcher, DispatcherBuilder, DispatcherCloser};

#[derive(Debug)]
struct Launcher {
    runner: Runner,
    status: SharedSink,
    launches: AtomicU64,
    stopped: AtomicBool,
}

impl Launcher {
    async fn launch(&self) {
        if self.stopped.load(Ordering::SeqCst) {
            debug!("generation stopped; ignoring launch");
            return;
        }
        let n = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(launch = n, "launch requested");

        let status = &self.status;
        let result = self
            .runner
            .launch(
                || status.write_line("[gwatch] Building..."),
                || status.write_line("[gwatch] Running..."),
            )
            .await;

        if let Err(err) = result {
            error!(launch = n, error = %err, "launch failed");
            status.write_line(&format!("[gwatch] {err}"));
        }
    }
}

/// Watch-build-run loop for one configuration snapshot.
pub struct Supervisor {
    dispatcher: Dispatcher,
    launcher: Arc<Launcher>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("dispatcher", &self.dispatcher)
            .field("launcher", &self.launcher)
            .finish()
    }
}

impl Supervisor {
    /// Resolve and arm the watch for `watch`, with status lines on stdout.
    pub fn new(watch: WatchConfig, runner: Runner) -> Result<Self> {
        Self::from_builder(DispatcherBuilder::new(watch), runner, ConsoleSink::stdout())
    }

    /// Register the launch handler on `builder` and build the dispatcher.
    ///
    /// `status` receives the `[gwatch] ...` lines.
    pub fn from_builder(builder: DispatcherBuilder, runner: Runner, status: SharedSink) -> Result<Self> {
        let launcher = Arc::new(Launcher {
            runner,
            status,
            launches: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        });

        let on_write = {
            let launcher = Arc::clone(&launcher);
            event_handler(move |event| {
                let launcher = Arc::clone(&launcher);
                async move {
                    info!(kind = %event.kind, path = ?event.path, "change detected");
                    launcher.launch().await;
                }
            })
        };

        let dispatcher = builder.on_event(ChangeKind::Write, on_write).build()?;
        Ok(Self {
            dispatcher,
            launcher,
        })
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            launcher: Arc::clone(&self.launcher),
            closer: self.dispatcher.closer(),
        }
    }

    /// Launch once, then keep relaunching on changes until killed.
    ///
    /// A fatal watch error stops the build and run processes and is
    /// returned.
    pub async fn start(self) -> Result<()> {
        let Supervisor {
            dispatcher,
            launcher,
        } = self;

        let ready = Arc::clone(&launcher);
        let result = dispatcher
            .listen_with(move |resolved| async move {
                let launcher = ready;
                let config = &resolved.config;
                launcher.status.write_line(&format!(
                    "[gwatch] watching path(s): {}",
                    resolved.root_paths().join(", ")
                ));
                launcher.status.write_line(&format!(
                    "[gwatch] watching extension(s): {}",
                    resolved.exts().join(", ")
                ));
                debug!(
                    root = ?config.root,
                    dirs = resolved.paths.len(),
                    "initial launch"
                );
                launcher.launch().await;
            })
            .await;

        if result.is_err() {
            launcher.stopped.store(true, Ordering::SeqCst);
            if let Err(err) = launcher.runner.close().await {
                warn!(error = %err, "could not stop processes after watch failure");
            }
        }
        result
    }
}

/// Tears down a running [`Supervisor`].
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    launcher: Arc<Launcher>,
    closer: DispatcherCloser,
}

impl SupervisorHandle {
    /// Stop watching, then stop the build and run processes.
    ///
    /// Safe to call more than once.
    pub async fn kill(&self) -> Result<()> {
        self.launcher.stopped.store(true, Ordering::SeqCst);
        self.closer.close();
        self.launcher.runner.close().await
    }

    /// Number of launches started so far.
    pub fn launches(&self) -> u64 {
        self.launcher.launches.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.launcher.runner.is_active()
    }
}
