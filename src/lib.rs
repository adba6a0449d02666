// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod supervisor;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::cli::CliArgs;
use crate::config::{config_base_dir, load_or_init, reload, ConfigFile, WatchConfig};
use crate::exec::{ConsoleSink, Runner};
use crate::fs::{FileSystem, RealFileSystem};
use crate::supervisor::{Supervisor, SupervisorHandle};
use crate::types::{format_duration, ChangeKind, ErrorPolicy};
use crate::watch::path_utils::{extension_of, normalize_path};
use crate::watch::{event_handler, resolve_path_set, DispatcherBuilder, DispatcherCloser};

/// Quiet period for changes to the config file itself.
const CONFIG_WATCH_DELAY: Duration = Duration::from_millis(100);

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (writing defaults on first use)
/// - one supervisor generation per config snapshot
/// - (optional) a watcher on the config file that swaps generations
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = absolute_config_path(Path::new(&args.config))?;
    let base = config_base_dir(&config_path)?;
    let fs = RealFileSystem;
    let mut cfg = load_or_init(&fs, &config_path, &base)
        .with_context(|| format!("loading config {}", config_path.display()))?;

    if args.dry_run {
        print_dry_run(&fs, &cfg)?;
        return Ok(());
    }

    let (reload_tx, mut reload_rx) = mpsc::unbounded_channel::<ConfigFile>();
    let config_watch = if args.no_config_watch {
        None
    } else {
        spawn_config_watch(&config_path, &base, reload_tx)?
    };
    let mut reloads_open = config_watch.is_some();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    // A broken first config is fatal; a broken reload keeps waiting for the
    // next one.
    let mut current = Some(Generation::start(&cfg)?);

    loop {
        let wake = tokio::select! {
            next = reload_rx.recv(), if reloads_open => Wake::Reload(next),
            res = &mut ctrl_c => Wake::Interrupt(res),
            res = wait_generation(&mut current) => Wake::Ended(res),
        };

        match wake {
            Wake::Reload(Some(next)) => {
                if let Some(generation) = current.take() {
                    generation.stop().await?;
                }
                println!("[gwatch] restarting gwatch due to changes to config file");
                cfg = next;
                current = match Generation::start(&cfg) {
                    Ok(generation) => Some(generation),
                    Err(err) => {
                        error!(error = %err, "could not start new generation");
                        println!("[gwatch] {err}");
                        None
                    }
                };
            }
            Wake::Reload(None) => {
                warn!("config watcher stopped; config changes will be ignored");
                reloads_open = false;
            }
            Wake::Interrupt(res) => {
                if let Err(e) = res {
                    eprintln!("failed to listen for Ctrl+C: {e}");
                }
                info!("interrupted; shutting down");
                if let Some(generation) = current.take() {
                    generation.stop().await?;
                }
                break;
            }
            Wake::Ended(res) => {
                current = None;
                res.context("supervisor task failed")?
                    .context("watcher error")?;
                info!("watcher ended");
                break;
            }
        }
    }

    if let Some(closer) = config_watch {
        closer.close();
    }
    Ok(())
}

enum Wake {
    Reload(Option<ConfigFile>),
    Interrupt(std::io::Result<()>),
    Ended(std::result::Result<errors::Result<()>, JoinError>),
}

/// One live supervisor and the task running it.
struct Generation {
    handle: SupervisorHandle,
    task: JoinHandle<errors::Result<()>>,
}

impl Generation {
    fn start(cfg: &ConfigFile) -> Result<Self> {
        let runner = Runner::from_config(
            &cfg.runner_config(),
            ConsoleSink::stdout(),
            ConsoleSink::stderr(),
        );
        let supervisor = Supervisor::new(cfg.watch_config(), runner)
            .context("starting file watcher")?;
        let handle = supervisor.handle();
        let task = tokio::spawn(supervisor.start());
        debug!(root = ?cfg.root, "generation started");
        Ok(Self { handle, task })
    }

    async fn stop(self) -> Result<()> {
        self.handle.kill().await?;
        self.task
            .await
            .context("supervisor task failed")?
            .context("watcher error")?;
        debug!("generation stopped");
        Ok(())
    }
}

async fn wait_generation(
    current: &mut Option<Generation>,
) -> std::result::Result<errors::Result<()>, JoinError> {
    match current {
        Some(generation) => (&mut generation.task).await,
        None => std::future::pending().await,
    }
}

fn absolute_config_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(normalize_path(path));
    }
    let cwd = std::env::current_dir().context("determining working directory")?;
    Ok(normalize_path(&cwd.join(path)))
}

/// Watch the directory holding the config file and post a fresh snapshot
/// whenever the file itself is written (or replaced, as many editors do).
///
/// Returns `None` when the file name has no extension to filter on.
fn spawn_config_watch(
    config_path: &Path,
    base: &Path,
    tx: mpsc::UnboundedSender<ConfigFile>,
) -> Result<Option<DispatcherCloser>> {
    let (Some(ext), Some(dir)) = (extension_of(config_path), config_path.parent()) else {
        warn!(path = ?config_path, "config file has no extension; not watching it for changes");
        return Ok(None);
    };

    let watch = WatchConfig::new(dir, vec![dir.to_path_buf()], [ext])
        .with_delay(CONFIG_WATCH_DELAY)
        .with_error_policy(ErrorPolicy::Log);

    let target = config_path.to_path_buf();
    let base = base.to_path_buf();
    let on_write = event_handler(move |event| {
        let target = target.clone();
        let base = base.clone();
        let tx = tx.clone();
        async move {
            if event.path != target {
                return;
            }
            match reload(&RealFileSystem, &target, &base) {
                Ok(cfg) => {
                    info!(path = ?target, "config file changed");
                    let _ = tx.send(cfg);
                }
                Err(err) => {
                    error!(error = %err, "config reload failed; keeping current settings");
                    println!("[gwatch] config reload failed: {err}");
                }
            }
        }
    });

    let dispatcher = DispatcherBuilder::new(watch)
        .on_event(ChangeKind::Write, on_write.clone())
        .on_event(ChangeKind::Create, on_write)
        .build()
        .context("watching config file")?;
    let closer = dispatcher.closer();
    tokio::spawn(dispatcher.listen());
    Ok(Some(closer))
}

/// Print what would be watched and run, without running anything.
fn print_dry_run(fs: &dyn FileSystem, cfg: &ConfigFile) -> Result<()> {
    let watch = &cfg.watch;
    let paths = resolve_path_set(fs, watch).context("resolving watch paths")?;

    println!("gwatch dry-run");
    println!("  root = {}", cfg.root.display());
    println!("  log_prefix = {}", cfg.log_prefix);
    println!();
    println!("watch:");
    println!("  exts: {}", watch.exts.join(", "));
    if !watch.exclude.is_empty() {
        println!("  exclude: {}", watch.exclude.join(", "));
    }
    println!("  recursive: {}", watch.recursive);
    println!("  delay: {}", format_duration(watch.delay));
    println!("  on_error: {}", watch.on_error);
    println!("  directories ({}):", paths.len());
    for dir in paths.iter() {
        println!("    - {}", dir.display());
    }
    println!();
    println!("build: {}", cfg.runner.build.join(" "));
    println!("run:   {}", cfg.runner.run.join(" "));

    debug!("dry-run complete (no execution)");
    Ok(())
}
