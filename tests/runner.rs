#![cfg(unix)]

mod common;
use crate::common::{init_tracing, process_alive, sh, wait_for, with_timeout, MemorySink};

use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use gwatch::config::RunnerConfig;
use gwatch::errors::GwatchError;
use gwatch::exec::{Command, Runner};

type TestResult = Result<(), Box<dyn Error>>;

fn runner(build: &str, run: &str) -> (Arc<Runner>, Arc<MemorySink>, Arc<MemorySink>) {
    let out = MemorySink::new();
    let err = MemorySink::new();
    let runner = Runner::new(
        Command::new("build", sh(build)).with_prefix("app"),
        Command::new("run", sh(run)).with_prefix("app"),
        out.clone(),
        err.clone(),
    );
    (Arc::new(runner), out, err)
}

#[tokio::test]
async fn failed_build_skips_the_run_step() -> TestResult {
    init_tracing();
    let (runner, out, err) = runner("echo 'main.go:3: syntax error' >&2; exit 1", "echo ran");
    let run_started = AtomicBool::new(false);

    let result = with_timeout(runner.launch(|| {}, || run_started.store(true, Ordering::SeqCst))).await;

    match result {
        Err(GwatchError::CommandFailed { label, code }) => {
            assert_eq!(label, "build");
            assert_eq!(code, Some(1));
        }
        other => panic!("expected build failure, got {other:?}"),
    }
    assert!(!run_started.load(Ordering::SeqCst));
    assert_eq!(err.lines(), vec!["app: main.go:3: syntax error"]);
    assert!(out.lines().is_empty());
    assert!(!runner.is_active());
    Ok(())
}

#[tokio::test]
async fn successful_build_is_followed_by_the_run_step() -> TestResult {
    init_tracing();
    let (runner, out, _err) = runner("echo building", "echo serving");
    let order = Mutex::new(Vec::new());

    with_timeout(runner.launch(
        || order.lock().unwrap().push("build"),
        || order.lock().unwrap().push("run"),
    ))
    .await?;

    assert_eq!(*order.lock().unwrap(), vec!["build", "run"]);
    assert_eq!(out.lines(), vec!["app: building", "app: serving"]);
    Ok(())
}

#[tokio::test]
async fn failing_program_is_reported_after_a_good_build() -> TestResult {
    let (runner, _out, _err) = runner("true", "exit 7");

    match with_timeout(runner.launch(|| {}, || {})).await {
        Err(GwatchError::CommandFailed { label, code }) => {
            assert_eq!(label, "run");
            assert_eq!(code, Some(7));
        }
        other => panic!("expected run failure, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn relaunch_terminates_the_running_program_first() -> TestResult {
    init_tracing();
    let (runner, out, _err) = runner("true", "echo up; exec sleep 30");

    let first = {
        let runner = Arc::clone(&runner);
        tokio::spawn(async move { runner.launch(|| {}, || {}).await })
    };
    wait_for("first program to print", || out.lines().len() == 1).await;
    let first_pid = runner.run_command().pid().expect("first program running");

    let first_alive_at_second_start = Arc::new(Mutex::new(None));
    let second = {
        let runner = Arc::clone(&runner);
        let flag = Arc::clone(&first_alive_at_second_start);
        tokio::spawn(async move {
            runner
                .launch(|| {}, move || {
                    *flag.lock().unwrap() = Some(process_alive(first_pid));
                })
                .await
        })
    };

    // The first launch ends quietly: its program was stopped, not failed.
    with_timeout(first).await??;
    wait_for("second program to start", || {
        first_alive_at_second_start.lock().unwrap().is_some()
    })
    .await;
    assert_eq!(*first_alive_at_second_start.lock().unwrap(), Some(false));

    let second_pid = runner.run_command().pid().expect("second program running");
    assert_ne!(first_pid, second_pid);

    with_timeout(runner.kill()).await?;
    with_timeout(second).await??;
    assert!(!process_alive(second_pid));
    assert!(!runner.is_active());
    Ok(())
}

#[tokio::test]
async fn kill_on_an_idle_runner_is_a_no_op() -> TestResult {
    let (runner, out, err) = runner("true", "true");

    with_timeout(runner.kill()).await?;
    with_timeout(runner.kill()).await?;

    assert!(!runner.is_active());
    assert!(out.lines().is_empty());
    assert!(err.lines().is_empty());
    Ok(())
}

#[tokio::test]
async fn from_config_runs_in_the_project_directory() -> TestResult {
    let dir = tempfile::tempdir()?;
    let root = dir.path().canonicalize()?;
    let out = MemorySink::new();

    let cfg = RunnerConfig {
        dir: root.clone(),
        build: vec!["true".into()],
        run: sh("pwd"),
        log_prefix: String::new(),
    };
    let runner = Runner::from_config(&cfg, out.clone(), MemorySink::new());

    with_timeout(runner.launch(|| {}, || {})).await?;
    assert_eq!(out.lines(), vec![root.display().to_string()]);
    Ok(())
}

#[tokio::test]
async fn kill_stops_an_in_flight_build_before_the_run_step() -> TestResult {
    init_tracing();
    let (runner, out, _err) = runner("echo building; exec sleep 30", "echo ran");
    let run_started = Arc::new(AtomicBool::new(false));

    let launch = {
        let runner = Arc::clone(&runner);
        let run_started = Arc::clone(&run_started);
        tokio::spawn(async move {
            runner
                .launch(|| {}, move || run_started.store(true, Ordering::SeqCst))
                .await
        })
    };
    wait_for("build to print", || out.contains("app: building")).await;
    let build_pid = runner.build_command().pid().expect("build running");

    with_timeout(runner.kill()).await?;
    with_timeout(launch).await??;

    assert!(!process_alive(build_pid));
    assert!(!run_started.load(Ordering::SeqCst));
    assert_eq!(out.lines(), vec!["app: building"]);
    assert!(!runner.is_active());

    // A plain kill does not stick.
    with_timeout(runner.launch(|| {}, || {})).await?;
    assert!(out.contains("app: ran"));
    Ok(())
}

#[tokio::test]
async fn closed_runner_never_starts_either_step_again() -> TestResult {
    init_tracing();
    let (runner, out, _err) = runner("echo building; exec sleep 30", "echo ran");

    let launch = {
        let runner = Arc::clone(&runner);
        tokio::spawn(async move { runner.launch(|| {}, || {}).await })
    };
    wait_for("build to print", || out.contains("app: building")).await;

    with_timeout(runner.close()).await?;
    with_timeout(launch).await??;

    let started = Mutex::new(Vec::new());
    with_timeout(runner.launch(
        || started.lock().unwrap().push("build"),
        || started.lock().unwrap().push("run"),
    ))
    .await?;

    assert!(started.lock().unwrap().is_empty());
    assert_eq!(out.lines(), vec!["app: building"]);
    assert!(!runner.is_active());
    Ok(())
}
