//! Shared handle to the activity log.

#![allow(missing_docs)]

use std::sync::Arc;

use parking_lot::Mutex;

use crate::logger::jsonl::{JsonlConfig, JsonlWriter, LogEntry};

/// Cloneable, thread-safe activity logger.
///
/// Operations run on caller threads and the reset worker; records are rare,
/// so writes are serialized behind a mutex instead of a logger thread.
#[derive(Clone)]
pub struct ActivityLog {
    writer: Arc<Mutex<JsonlWriter>>,
}

impl ActivityLog {
    pub fn open(config: JsonlConfig) -> Self {
        Self {
            writer: Arc::new(Mutex::new(JsonlWriter::open(config))),
        }
    }

    /// Logger that records nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            writer: Arc::new(Mutex::new(JsonlWriter::discard())),
        }
    }

    pub fn record(&self, entry: &LogEntry) {
        self.writer.lock().write_entry(entry);
    }

    /// Degradation state of the underlying writer.
    pub fn state(&self) -> &'static str {
        self.writer.lock().state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::jsonl::{EventType, Severity};
    use std::thread;

    #[test]
    fn clones_share_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.jsonl");
        let log = ActivityLog::open(JsonlConfig {
            fallback_path: None,
            ..JsonlConfig::at(&path)
        });

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let log = log.clone();
                thread::spawn(move || {
                    for _ in 0..5 {
                        log.record(&LogEntry::new(EventType::FrontPanel, Severity::Info));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 20);
        for line in contents.lines() {
            let _: serde_json::Value = serde_json::from_str(line).unwrap();
        }
    }

    #[test]
    fn disabled_log_discards() {
        let log = ActivityLog::disabled();
        log.record(&LogEntry::new(EventType::Error, Severity::Info));
        assert_eq!(log.state(), "discard");
    }
}
