#![allow(dead_code)]

pub use gwatch_test_utils::*;

use std::sync::{Arc, Mutex};

use gwatch::watch::{event_handler, ChangeEvent, EventHandler};

/// argv for `sh -c <script>`.
pub fn sh(script: &str) -> Vec<String> {
    vec!["sh".into(), "-c".into(), script.into()]
}

/// Handler that records every event it is invoked with.
pub fn recording_handler() -> (EventHandler, Arc<Mutex<Vec<ChangeEvent>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handler = {
        let seen = Arc::clone(&seen);
        event_handler(move |event| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().unwrap().push(event);
            }
        })
    };
    (handler, seen)
}

pub fn count_lines(sink: &MemorySink, needle: &str) -> usize {
    sink.lines().iter().filter(|l| l.contains(needle)).count()
}
