// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`signal`] provides the one-shot stop notification.
//! - [`output`] holds output sinks and the line pumps feeding them.
//! - [`command`] runs one external command with preempting semantics.
//! - [`runner`] chains the build and run commands into a launch.

pub mod command;
pub mod output;
pub mod runner;
pub mod signal;

pub use command::{Command, CommandState, StopReason};
pub use output::{ConsoleSink, MemorySink, OutputSink, SharedSink};
pub use runner::Runner;
pub use signal::StopSignal;
