//! Background execution of factory resets.

#![allow(missing_docs)]

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, WhmError};
use crate::logger::activity::ActivityLog;
use crate::logger::jsonl::{EventType, LogEntry, Severity};
use crate::service::events::{EventSink, RESET_DONE};
use crate::service::power::PowerManager;

/// Payload of the `resetDone` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetDone {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResetDone {
    fn from_outcome(outcome: &Result<()>) -> Self {
        match outcome {
            Ok(()) => Self {
                success: true,
                error: None,
            },
            Err(err @ WhmError::Unsupported { .. }) => Self {
                success: false,
                error: Some(err.message()),
            },
            Err(_) => Self {
                success: false,
                error: Some("Reset failed".to_string()),
            },
        }
    }
}

/// Runs one factory reset at a time off the caller's thread.
///
/// A new request first waits for the previous one to finish. Dropping the
/// worker waits for the running reset.
pub struct ResetWorker {
    power: Arc<dyn PowerManager>,
    events: Arc<dyn EventSink>,
    log: ActivityLog,
    current: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ResetWorker {
    #[must_use]
    pub fn new(power: Arc<dyn PowerManager>, events: Arc<dyn EventSink>, log: ActivityLog) -> Self {
        Self {
            power,
            events,
            log,
            current: Mutex::new(None),
        }
    }

    /// Queue a reset; completion is reported through `resetDone`.
    pub fn request(&self, suppress_reboot: bool) -> Result<()> {
        let mut current = self.current.lock();
        if let Some(previous) = current.take() {
            join_reset(previous);
        }

        let power = Arc::clone(&self.power);
        let events = Arc::clone(&self.events);
        let log = self.log.clone();
        let handle = thread::Builder::new()
            .name("whm-reset".to_string())
            .spawn(move || {
                let started = Instant::now();
                let outcome = power.warehouse_reset(suppress_reboot);

                let mut entry = LogEntry::new(EventType::FactoryReset, Severity::Critical)
                    .with_outcome(outcome.as_ref().map(|_| ()));
                entry.suppress_reboot = Some(suppress_reboot);
                entry.duration_ms = u64::try_from(started.elapsed().as_millis()).ok();
                log.record(&entry);

                let done = ResetDone::from_outcome(&outcome);
                match serde_json::to_value(&done) {
                    Ok(payload) => events.notify(RESET_DONE, payload),
                    Err(err) => eprintln!("[WHM-RESET] failed to encode {RESET_DONE}: {err}"),
                }
            })
            .map_err(|source| WhmError::Runtime {
                details: format!("failed to spawn reset thread: {source}"),
            })?;
        *current = Some(handle);
        Ok(())
    }

    /// Block until the running reset (if any) has finished.
    pub fn wait(&self) {
        let handle = self.current.lock().take();
        if let Some(handle) = handle {
            join_reset(handle);
        }
    }
}

impl Drop for ResetWorker {
    fn drop(&mut self) {
        self.wait();
    }
}

fn join_reset(handle: thread::JoinHandle<()>) {
    if handle.join().is_err() {
        eprintln!("[WHM-RESET] reset thread panicked");
    }
}
