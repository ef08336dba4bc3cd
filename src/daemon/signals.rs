//! SIGTERM/SIGINT handling for long-running commands.
//!
//! Uses `signal-hook` flag registration; callers poll instead of blocking in a
//! signal handler.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use signal_hook::consts::{SIGINT, SIGTERM};

/// Shutdown flag shared with the OS signal hooks.
#[derive(Clone)]
pub struct SignalHandler {
    shutdown_flag: Arc<AtomicBool>,
}

impl SignalHandler {
    /// Create a handler and register SIGTERM/SIGINT.
    ///
    /// Registration is best-effort; failures are reported on stderr.
    pub fn new() -> Self {
        let handler = Self::unregistered();
        for (name, signal) in [("SIGTERM", SIGTERM), ("SIGINT", SIGINT)] {
            if let Err(e) = signal_hook::flag::register(signal, Arc::clone(&handler.shutdown_flag)) {
                eprintln!("[WHM-SIGNAL] failed to register {name}: {e}");
            }
        }
        handler
    }

    /// Handler not wired to any OS signal.
    #[must_use]
    pub fn unregistered() -> Self {
        Self {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn should_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    pub fn request_shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }

    /// Block until shutdown is requested, checking every `poll`.
    pub fn wait_for_shutdown(&self, poll: Duration) {
        while !self.should_shutdown() {
            thread::sleep(poll);
        }
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}
