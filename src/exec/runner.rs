// src/exec/runner.rs

//! Build-then-run orchestration.

use tracing::{debug, info};

use crate::config::RunnerConfig;
use crate::errors::Result;
use crate::exec::command::{Command, StopReason};
use crate::exec::output::SharedSink;

/// Owns the build command and the run command of one generation.
///
/// `launch` runs the build to completion and, only if it succeeded, starts
/// the freshly built binary. Each command preempts its own previous
/// invocation, so overlapping launches stop the older build (or the older
/// run) before starting the newer one.
#[derive(Debug)]
pub struct Runner {
    build: Command,
    run: Command,
    stdout: SharedSink,
    stderr: SharedSink,
}

impl Runner {
    pub fn new(build: Command, run: Command, stdout: SharedSink, stderr: SharedSink) -> Self {
        Self {
            build,
            run,
            stdout,
            stderr,
        }
    }

    pub fn from_config(cfg: &RunnerConfig, stdout: SharedSink, stderr: SharedSink) -> Self {
        let build = Command::new("build", cfg.build.clone())
            .with_prefix(cfg.log_prefix.clone())
            .with_dir(cfg.dir.clone());
        let run = Command::new("run", cfg.run.clone())
            .with_prefix(cfg.log_prefix.clone())
            .with_dir(cfg.dir.clone());
        Self::new(build, run, stdout, stderr)
    }

    pub fn build_command(&self) -> &Command {
        &self.build
    }

    pub fn run_command(&self) -> &Command {
        &self.run
    }

    /// Build, then run. Returns once the run step ends.
    ///
    /// A failed build is returned as an error and the run step is skipped.
    /// A build that was stopped by a newer launch (or by `kill`) ends this
    /// launch quietly.
    pub async fn launch<B, R>(&self, on_build_start: B, on_run_start: R) -> Result<()>
    where
        B: FnOnce() + Send,
        R: FnOnce() + Send,
    {
        let built = self
            .build
            .run(self.stdout.clone(), self.stderr.clone(), on_build_start)
            .await?;

        if let StopReason::Killed = built {
            debug!("build superseded; skipping run");
            return Ok(());
        }
        built.into_result(self.build.name())?;
        info!("build succeeded");

        self.run
            .run(self.stdout.clone(), self.stderr.clone(), on_run_start)
            .await?
            .into_result(self.run.name())
    }

    /// Stop both commands, build first. No-op for idle commands.
    pub async fn kill(&self) -> Result<()> {
        self.build.kill().await?;
        self.run.kill().await
    }

    /// Stop both commands for good: a launch still in flight (or started
    /// later) runs neither step.
    pub async fn close(&self) -> Result<()> {
        self.build.close().await?;
        self.run.close().await
    }

    pub fn is_active(&self) -> bool {
        self.build.is_active() || self.run.is_active()
    }
}
