// src/exec/command.rs

//! A single external command with preempting `run` semantics.
//!
//! A [`Command`] owns at most one live child process. Calling `run` while a
//! previous invocation is still active stops that invocation first; it never
//! queues behind it. `kill` stops whatever is active and waits until the
//! child has been reaped.
//!
//! Two locks are involved:
//! - `slot` (async) is held for the whole lifetime of one invocation, from
//!   spawn until the child is reaped. Holding it is what "active" means.
//! - `inner` (sync, never held across an await) guards the tagged state, the
//!   current stop signal and the invocation ticket counter.
//!
//! A caller that wants the slot first bumps the ticket and fires the current
//! stop signal, then waits for the slot. Once it gets the slot it checks its
//! ticket: if someone newer has bumped it meanwhile, this invocation was
//! superseded before it started and returns [`StopReason::Killed`].
//!
//! `close` is a `kill` that sticks: every later `run` returns `Killed`
//! without spawning. It is used when the owning generation is torn down.

use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{GwatchError, Result};
use crate::exec::output::{pump_lines, SharedSink};
use crate::exec::signal::StopSignal;

/// How long to wait for output pumps after the child is gone. A grandchild
/// can keep the pipes open well past that.
const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Lifecycle of a [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// How one `run` invocation ended.
#[derive(Debug)]
pub enum StopReason {
    /// The child exited on its own. `None` means it was killed by a signal
    /// nobody here sent.
    NaturalExit(Option<i32>),
    /// Stopped on request (by `kill` or a newer `run`), or superseded before
    /// it could start.
    Killed,
    /// The child could not be started.
    StartFailure(GwatchError),
}

impl StopReason {
    pub fn is_killed(&self) -> bool {
        matches!(self, StopReason::Killed)
    }

    /// Map to a plain result: a kill or a zero exit is success.
    pub fn into_result(self, label: &str) -> Result<()> {
        match self {
            StopReason::NaturalExit(Some(0)) | StopReason::Killed => Ok(()),
            StopReason::NaturalExit(code) => Err(GwatchError::CommandFailed {
                label: label.to_string(),
                code,
            }),
            StopReason::StartFailure(err) => Err(err),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CommandState,
    ticket: u64,
    stop: Option<StopSignal>,
    pid: Option<u32>,
    closed: bool,
}

#[derive(Debug)]
pub struct Command {
    name: String,
    argv: Vec<String>,
    prefix: String,
    dir: Option<PathBuf>,
    slot: tokio::sync::Mutex<()>,
    inner: Mutex<Inner>,
}

enum Outcome {
    Exited(io::Result<ExitStatus>),
    Stopped,
}

impl Command {
    /// `name` labels log lines and errors; `argv[0]` is the program.
    pub fn new(name: impl Into<String>, argv: Vec<String>) -> Self {
        Self {
            name: name.into(),
            argv,
            prefix: String::new(),
            dir: None,
            slot: tokio::sync::Mutex::new(()),
            inner: Mutex::new(Inner {
                state: CommandState::Idle,
                ticket: 0,
                stop: None,
                pid: None,
                closed: false,
            }),
        }
    }

    /// Prefix every output line with `prefix`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn state(&self) -> CommandState {
        self.lock_inner().state
    }

    pub fn is_active(&self) -> bool {
        self.state() != CommandState::Idle
    }

    /// PID of the live child, if one is running.
    pub fn pid(&self) -> Option<u32> {
        self.lock_inner().pid
    }

    /// Run the command to completion, preempting any active invocation.
    ///
    /// Output is copied line by line to `stdout` / `stderr`. `on_start` is
    /// called once the child has been spawned; it is not called if the
    /// invocation is superseded or fails to start.
    ///
    /// Only a failure to signal a child that is still alive is returned as
    /// `Err`; everything else is described by the [`StopReason`].
    pub async fn run<F>(&self, stdout: SharedSink, stderr: SharedSink, on_start: F) -> Result<StopReason>
    where
        F: FnOnce() + Send,
    {
        let ticket = {
            let mut inner = self.lock_inner();
            if inner.closed {
                debug!(command = %self.name, "command closed; not starting");
                return Ok(StopReason::Killed);
            }
            inner.ticket += 1;
            if let Some(stop) = &inner.stop {
                if stop.fire() {
                    debug!(command = %self.name, "preempting active invocation");
                }
            }
            inner.ticket
        };

        let _slot = self.slot.lock().await;

        let stop = {
            let mut inner = self.lock_inner();
            if inner.ticket != ticket {
                debug!(command = %self.name, "invocation superseded before start");
                return Ok(StopReason::Killed);
            }
            let stop = StopSignal::new();
            inner.state = CommandState::Starting;
            inner.stop = Some(stop.clone());
            stop
        };
        // Dropped before `_slot`, so the reset happens while the slot is held.
        let _reset = ResetOnDrop { command: self };

        let mut child = match self.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(command = %self.name, error = %err, "command failed to start");
                return Ok(StopReason::StartFailure(err));
            }
        };

        let pid = child.id();
        let (Some(out), Some(err)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Ok(StopReason::StartFailure(GwatchError::CommandStart {
                label: self.name.clone(),
                source: io::Error::other("output pipes unavailable"),
            }));
        };
        {
            let mut inner = self.lock_inner();
            inner.state = CommandState::Running;
            inner.pid = pid;
        }
        let pumps = [
            pump_lines(out, self.prefix.clone(), stdout),
            pump_lines(err, self.prefix.clone(), stderr),
        ];
        info!(command = %self.name, pid = ?pid, "command started");
        on_start();

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            _ = stop.fired() => Outcome::Stopped,
        };

        match outcome {
            Outcome::Exited(status) => {
                let status = status?;
                drain(pumps).await;
                if stop.is_fired() && !status.success() {
                    // Died while we were stopping it.
                    info!(command = %self.name, "command stopped");
                    return Ok(StopReason::Killed);
                }
                info!(command = %self.name, code = ?status.code(), "command exited");
                Ok(StopReason::NaturalExit(status.code()))
            }
            Outcome::Stopped => {
                self.lock_inner().state = CommandState::Stopping;
                self.terminate(&mut child).await?;
                drain(pumps).await;
                info!(command = %self.name, "command stopped");
                Ok(StopReason::Killed)
            }
        }
    }

    /// Stop the active invocation, if any, and wait until it is reaped.
    ///
    /// Returns `Ok(())` immediately when nothing is active.
    pub async fn kill(&self) -> Result<()> {
        self.stop_active(false).await
    }

    /// Like [`Command::kill`], and refuse every later `run`.
    pub async fn close(&self) -> Result<()> {
        self.stop_active(true).await
    }

    pub fn is_closed(&self) -> bool {
        self.lock_inner().closed
    }

    async fn stop_active(&self, close: bool) -> Result<()> {
        // Bumping the ticket also cancels any invocation still queued for
        // the slot.
        let stop = {
            let mut inner = self.lock_inner();
            inner.closed |= close;
            inner.ticket += 1;
            inner.stop.clone()
        };

        let Some(stop) = stop else {
            return Ok(());
        };

        stop.fire();
        debug!(command = %self.name, "kill requested");
        let _slot = self.slot.lock().await;
        Ok(())
    }

    fn spawn(&self) -> Result<Child> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(GwatchError::CommandStart {
                label: self.name.clone(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "empty command line"),
            });
        };

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }

        debug!(command = %self.name, argv = ?self.argv, "spawning");
        cmd.spawn().map_err(|source| GwatchError::CommandStart {
            label: self.name.clone(),
            source,
        })
    }

    /// Signal the child and reap it. "Already exited" is not an error.
    async fn terminate(&self, child: &mut Child) -> Result<()> {
        match child.start_kill() {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
                debug!(command = %self.name, "child already exited");
            }
            Err(source) => {
                return Err(GwatchError::Signal {
                    label: self.name.clone(),
                    source,
                });
            }
        }
        child.wait().await?;
        Ok(())
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct ResetOnDrop<'a> {
    command: &'a Command,
}

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        let mut inner = self.command.lock_inner();
        inner.state = CommandState::Idle;
        inner.stop = None;
        inner.pid = None;
    }
}

async fn drain(pumps: [JoinHandle<()>; 2]) {
    for pump in pumps {
        if tokio::time::timeout(PUMP_DRAIN_TIMEOUT, pump).await.is_err() {
            debug!("output pump still open after child exit");
        }
    }
}
