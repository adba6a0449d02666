// src/exec/output.rs

//! Where child process output goes.

use std::fmt::Debug;
use std::io::Write;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// Destination for prefixed output lines.
pub trait OutputSink: Send + Sync + Debug {
    fn write_line(&self, line: &str);
}

pub type SharedSink = Arc<dyn OutputSink>;

/// The process's own stdout or stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleSink {
    Stdout,
    Stderr,
}

impl ConsoleSink {
    pub fn stdout() -> SharedSink {
        Arc::new(ConsoleSink::Stdout)
    }

    pub fn stderr() -> SharedSink {
        Arc::new(ConsoleSink::Stderr)
    }
}

impl OutputSink for ConsoleSink {
    fn write_line(&self, line: &str) {
        // A closed terminal is not worth failing a build over.
        let _ = match self {
            ConsoleSink::Stdout => writeln!(std::io::stdout().lock(), "{line}"),
            ConsoleSink::Stderr => writeln!(std::io::stderr().lock(), "{line}"),
        };
    }
}

/// Sink that keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }
}

impl OutputSink for MemorySink {
    fn write_line(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(line.to_string());
    }
}

/// `"{label}: {line}"`, or the bare line when there is no label.
pub fn format_line(label: &str, line: &str) -> String {
    if label.is_empty() {
        line.to_string()
    } else {
        format!("{label}: {line}")
    }
}

/// Copy `reader` to `sink` line by line until EOF or a read error.
///
/// Lines are split on raw `\n` bytes and decoded lossily, so a child that
/// prints invalid UTF-8 keeps its pipe drained and its output visible.
pub fn pump_lines<R>(reader: R, label: String, sink: SharedSink) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(strip_line_end(&buf));
                    sink.write_line(&format_line(&label, &line));
                }
                Err(e) => {
                    warn!(label = %label, error = %e, "output pipe read failed");
                    break;
                }
            }
        }
        trace!(label = %label, "output pump finished");
    })
}

fn strip_line_end(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}
