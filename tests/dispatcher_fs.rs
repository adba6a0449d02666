mod common;
use crate::common::{init_tracing, recording_handler, with_timeout, wait_for, TempProject};

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gwatch::errors::GwatchError;
use gwatch::types::{ChangeKind, ErrorPolicy};
use gwatch::config::WatchConfig;
use gwatch::watch::{DispatcherBuilder, ResolvedWatchConfig};

type TestResult = Result<(), Box<dyn Error>>;

fn go_project() -> TempProject {
    let project = TempProject::new();
    project.write("a.go", "package main\n");
    project.write("b.go", "package main\n");
    project.write("notes.txt", "todo\n");
    project.write("pkg/util/util.go", "package util\n");
    project.write("vendor/dep/dep.go", "package dep\n");
    project
}

fn watch_config(project: &TempProject, delay_ms: u64) -> WatchConfig {
    WatchConfig::new(project.root(), vec![project.root().to_path_buf()], ["go"])
        .with_recursive(true)
        .with_exclude(["vendor"])
        .with_delay(Duration::from_millis(delay_ms))
        .with_error_policy(ErrorPolicy::Log)
}

/// Give the OS watcher a moment to settle after arming.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn writes_within_the_delay_trigger_one_handler_call() -> TestResult {
    init_tracing();
    let project = go_project();
    let (handler, seen) = recording_handler();

    let dispatcher = DispatcherBuilder::new(watch_config(&project, 100))
        .on_event(ChangeKind::Write, handler)
        .build()?;
    let closer = dispatcher.closer();
    let listening = tokio::spawn(dispatcher.listen());
    settle().await;

    project.write("a.go", "package main // a\n");
    tokio::time::sleep(Duration::from_millis(20)).await;
    project.write("b.go", "package main // b\n");

    wait_for("one handler call", || seen.lock().unwrap().len() == 1).await;
    tokio::time::sleep(Duration::from_millis(400)).await;

    let events = seen.lock().unwrap().clone();
    assert_eq!(events.len(), 1, "got {events:?}");
    assert_eq!(events[0].path, project.path("b.go"));
    assert_eq!(events[0].kind, ChangeKind::Write);

    closer.close();
    with_timeout(listening).await??;
    Ok(())
}

#[tokio::test]
async fn writes_separated_by_more_than_the_delay_trigger_twice() -> TestResult {
    init_tracing();
    let project = go_project();
    let (handler, seen) = recording_handler();

    let dispatcher = DispatcherBuilder::new(watch_config(&project, 100))
        .on_event(ChangeKind::Write, handler)
        .build()?;
    let closer = dispatcher.closer();
    let listening = tokio::spawn(dispatcher.listen());
    settle().await;

    project.write("a.go", "package main // 1\n");
    wait_for("first handler call", || seen.lock().unwrap().len() == 1).await;
    tokio::time::sleep(Duration::from_millis(400)).await;
    project.write("a.go", "package main // 2\n");
    wait_for("second handler call", || seen.lock().unwrap().len() == 2).await;

    assert!(seen
        .lock()
        .unwrap()
        .iter()
        .all(|e| e.path == project.path("a.go")));

    closer.close();
    with_timeout(listening).await??;
    Ok(())
}

#[tokio::test]
async fn unwatched_extensions_and_excluded_dirs_never_trigger() -> TestResult {
    init_tracing();
    let project = go_project();
    let (handler, seen) = recording_handler();

    let dispatcher = DispatcherBuilder::new(watch_config(&project, 50))
        .on_event(ChangeKind::Write, handler)
        .build()?;
    assert!(!dispatcher
        .resolved()
        .paths
        .contains(&project.path("vendor")));
    let closer = dispatcher.closer();
    let listening = tokio::spawn(dispatcher.listen());
    settle().await;

    project.write("notes.txt", "done\n");
    project.write("vendor/dep/dep.go", "package dep // changed\n");
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(seen.lock().unwrap().is_empty());

    // Still listening: a watched file in a subdirectory does fire.
    project.write("pkg/util/util.go", "package util // changed\n");
    wait_for("handler call for util.go", || seen.lock().unwrap().len() == 1).await;
    assert_eq!(seen.lock().unwrap()[0].path, project.path("pkg/util/util.go"));

    closer.close();
    with_timeout(listening).await??;
    Ok(())
}

#[tokio::test]
async fn on_ready_sees_the_resolved_directories() -> TestResult {
    init_tracing();
    let project = go_project();

    let dispatcher = DispatcherBuilder::new(watch_config(&project, 50)).build()?;
    let closer = dispatcher.closer();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Arc<ResolvedWatchConfig>>();
    let listening = tokio::spawn(dispatcher.listen_with(move |resolved| async move {
        let _ = tx.send(resolved);
    }));

    let resolved = with_timeout(rx.recv()).await.expect("on_ready called");
    let dirs: Vec<PathBuf> = resolved.paths.iter().cloned().collect();
    assert_eq!(
        dirs,
        vec![
            project.root().to_path_buf(),
            project.path("pkg"),
            project.path("pkg/util"),
        ]
    );
    assert_eq!(resolved.root_paths(), vec!["."]);

    closer.close();
    closer.close();
    with_timeout(listening).await??;
    Ok(())
}

#[test]
fn build_fails_for_a_missing_root() {
    let project = TempProject::new();
    let config = WatchConfig::new(project.root(), vec![project.path("missing")], ["go"]);

    match DispatcherBuilder::new(config).build() {
        Err(GwatchError::PathWalk { path, .. }) => assert_eq!(path, project.path("missing")),
        other => panic!("expected PathWalk error, got {other:?}"),
    }
}

#[test]
fn build_fails_for_an_invalid_exclude_pattern() {
    let project = TempProject::new();
    let config = WatchConfig::new(project.root(), vec![project.root().to_path_buf()], ["go"])
        .with_exclude(["[unclosed"]);

    assert!(matches!(
        DispatcherBuilder::new(config).build(),
        Err(GwatchError::ConfigError(_))
    ));
}
