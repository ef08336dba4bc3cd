//! Asynchronous notifications emitted by the service.

#![allow(missing_docs)]

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Emitted once a factory reset request has been handled.
pub const RESET_DONE: &str = "resetDone";

/// Emitted after device details were collected.
pub const DEVICE_INFO_RETRIEVED: &str = "deviceInfoRetrieved";

/// A named notification with a JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub payload: Value,
}

/// Receives service notifications. Called from worker threads.
pub trait EventSink: Send + Sync {
    fn notify(&self, name: &str, payload: Value);
}

/// Forwards events over a channel.
pub struct ChannelEventSink {
    tx: Sender<Event>,
}

impl ChannelEventSink {
    /// Sink plus the receiving end of its channel.
    #[must_use]
    pub fn new() -> (Self, Receiver<Event>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn notify(&self, name: &str, payload: Value) {
        let _ = self.tx.send(Event {
            name: name.to_string(),
            payload,
        });
    }
}

/// Keeps every event in memory.
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingEventSink {
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

impl EventSink for RecordingEventSink {
    fn notify(&self, name: &str, payload: Value) {
        self.events.lock().push(Event {
            name: name.to_string(),
            payload,
        });
    }
}

/// Drops every event.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn notify(&self, _name: &str, _payload: Value) {}
}
