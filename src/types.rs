use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use notify::EventKind;
use notify::event::{ModifyKind, RenameMode};
use serde::{Deserialize, Serialize};

/// Kind of filesystem change delivered by the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeKind {
    /// File attributes changed (permissions, timestamps, ...).
    Chmod,
    /// File contents were written. This does not mean the write has finished.
    Write,
    /// A file or directory was created.
    Create,
    /// A path was removed.
    Remove,
    /// A path was renamed away.
    Rename,
}

impl ChangeKind {
    /// Map a raw `notify` event kind onto a change kind.
    ///
    /// Returns `None` for access notifications and other kinds we never
    /// dispatch. A rename's destination side is reported as `Create`, the
    /// source side as `Rename`.
    pub fn from_notify(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(ChangeKind::Create),
            EventKind::Remove(_) => Some(ChangeKind::Remove),
            EventKind::Modify(ModifyKind::Metadata(_)) => Some(ChangeKind::Chmod),
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(ChangeKind::Create),
            EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeKind::Rename),
            EventKind::Modify(_) => Some(ChangeKind::Write),
            EventKind::Any => Some(ChangeKind::Write),
            EventKind::Access(_) | EventKind::Other => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Chmod => "CHMOD",
            ChangeKind::Write => "WRITE",
            ChangeKind::Create => "CREATE",
            ChangeKind::Remove => "REMOVE",
            ChangeKind::Rename => "RENAME",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the dispatcher does with watch errors once listening has started.
///
/// - `Fatal` (default): report the error and terminate the process. A watch
///   that silently degrades is worse than a crash with a message.
/// - `Log`: report the error and keep listening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    #[default]
    Fatal,
    Log,
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorPolicy::Fatal => "fatal",
            ErrorPolicy::Log => "log",
        })
    }
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fatal" => Ok(ErrorPolicy::Fatal),
            "log" => Ok(ErrorPolicy::Log),
            other => Err(format!(
                "invalid on_error policy: {other} (expected \"fatal\" or \"log\")"
            )),
        }
    }
}

/// Parse a simple duration string such as `"100ms"`, `"2s"`, `"1m"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

/// Render a duration the way `parse_duration` accepts it.
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms % 1000 == 0 && ms > 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{ms}ms")
    }
}
