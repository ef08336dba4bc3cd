//! Front-panel LED signalling of the image download state.
//!
//! Two indicators (message and record) plus a panel-wide brightness encode
//! three states. While a download is in progress or has failed, the pattern is
//! advanced on a worker thread every `interval` until another state is set.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::config::FrontPanelConfig;
use crate::core::errors::{Result, WhmError};

/// Download state shown on the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrontPanelState {
    None,
    DownloadInProgress,
    DownloadFailed,
}

impl FrontPanelState {
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::None => -1,
            Self::DownloadInProgress => 1,
            Self::DownloadFailed => 3,
        }
    }

    /// Whether the state animates after being set.
    #[must_use]
    pub const fn blinks(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl TryFrom<i32> for FrontPanelState {
    type Error = WhmError;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            -1 => Ok(Self::None),
            1 => Ok(Self::DownloadInProgress),
            3 => Ok(Self::DownloadFailed),
            _ => Err(WhmError::InvalidParameter {
                details: "incorrect state".to_string(),
            }),
        }
    }
}

/// LED indicators on the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    Message,
    Record,
}

/// One step of a blink pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Lights {
    pub message: bool,
    pub record: bool,
    /// Percent, 0..=100.
    pub brightness: u8,
}

/// Pattern step `iteration` for `state`.
///
/// In progress, the message LED is lit for four steps then the record LED for
/// four, while brightness sweeps 100, 75, 50, 25, 0, 25, 50, 75. Failed
/// alternates the two LEDs at full brightness.
#[must_use]
pub fn lights_for(state: FrontPanelState, iteration: u32) -> Lights {
    match state {
        FrontPanelState::None => Lights {
            message: false,
            record: false,
            brightness: 100,
        },
        FrontPanelState::DownloadInProgress => {
            let message = (iteration / 4) % 2 == 0;
            let level = 100_u32.abs_diff(25 * (iteration % 8));
            Lights {
                message,
                record: !message,
                brightness: u8::try_from(level).unwrap_or(100),
            }
        }
        FrontPanelState::DownloadFailed => {
            let message = iteration % 2 == 0;
            Lights {
                message,
                record: !message,
                brightness: 100,
            }
        }
    }
}

/// LED hardware.
///
/// Each call reports whether the hardware accepted the change.
pub trait FrontPanel: Send + Sync {
    fn power_on_led(&self, indicator: Indicator) -> bool;
    fn power_off_led(&self, indicator: Indicator) -> bool;
    fn set_brightness(&self, percent: u8) -> bool;
}

/// Push `lights` to `panel`. True if any call took effect.
pub fn apply_lights(panel: &dyn FrontPanel, lights: Lights) -> bool {
    let mut did_set = false;
    for (indicator, on) in [
        (Indicator::Message, lights.message),
        (Indicator::Record, lights.record),
    ] {
        did_set |= if on {
            panel.power_on_led(indicator)
        } else {
            panel.power_off_led(indicator)
        };
    }
    did_set |= panel.set_brightness(lights.brightness);
    did_set
}

/// Front panel backed by Linux LED class devices (`/sys/class/leds/<name>`).
///
/// Lit LEDs are driven at `max_brightness` scaled by the panel brightness.
pub struct SysfsFrontPanel {
    message: PathBuf,
    record: PathBuf,
    state: Mutex<PanelState>,
}

#[derive(Debug, Clone, Copy)]
struct PanelState {
    brightness: u8,
    message_on: bool,
    record_on: bool,
}

impl SysfsFrontPanel {
    #[must_use]
    pub fn new(leds_dir: &Path, message_led: &str, record_led: &str) -> Self {
        Self {
            message: leds_dir.join(message_led),
            record: leds_dir.join(record_led),
            state: Mutex::new(PanelState {
                brightness: 100,
                message_on: false,
                record_on: false,
            }),
        }
    }

    /// Build from config, or `None` when no LEDs are configured.
    #[must_use]
    pub fn from_config(config: &FrontPanelConfig) -> Option<Self> {
        match (&config.message_led, &config.record_led) {
            (Some(message), Some(record)) => Some(Self::new(&config.leds_dir, message, record)),
            _ => None,
        }
    }

    fn led_dir(&self, indicator: Indicator) -> &Path {
        match indicator {
            Indicator::Message => &self.message,
            Indicator::Record => &self.record,
        }
    }

    fn write_level(&self, indicator: Indicator, on: bool, brightness: u8) -> bool {
        let dir = self.led_dir(indicator);
        let level = if on {
            let max = fs::read_to_string(dir.join("max_brightness"))
                .ok()
                .and_then(|raw| raw.trim().parse::<u32>().ok())
                .unwrap_or(255);
            max * u32::from(brightness) / 100
        } else {
            0
        };
        match fs::write(dir.join("brightness"), format!("{level}\n")) {
            Ok(()) => true,
            Err(err) => {
                eprintln!(
                    "[WHM-PANEL] failed to drive {}: {err}",
                    dir.display()
                );
                false
            }
        }
    }

    fn set_led(&self, indicator: Indicator, on: bool) -> bool {
        let mut state = self.state.lock();
        if !self.write_level(indicator, on, state.brightness) {
            return false;
        }
        match indicator {
            Indicator::Message => state.message_on = on,
            Indicator::Record => state.record_on = on,
        }
        true
    }
}

impl FrontPanel for SysfsFrontPanel {
    fn power_on_led(&self, indicator: Indicator) -> bool {
        self.set_led(indicator, true)
    }

    fn power_off_led(&self, indicator: Indicator) -> bool {
        self.set_led(indicator, false)
    }

    fn set_brightness(&self, percent: u8) -> bool {
        let percent = percent.min(100);
        let snapshot = {
            let mut state = self.state.lock();
            state.brightness = percent;
            *state
        };
        let mut did_set = false;
        if snapshot.message_on {
            did_set |= self.write_level(Indicator::Message, true, percent);
        }
        if snapshot.record_on {
            did_set |= self.write_level(Indicator::Record, true, percent);
        }
        // Nothing lit: the level is latched for the next power-on but no
        // hardware accepted anything.
        did_set
    }
}

struct Blink {
    state: FrontPanelState,
    stop: Sender<()>,
    handle: thread::JoinHandle<()>,
}

/// Drives a [`FrontPanel`] through a state's blink pattern.
///
/// At most one pattern runs at a time; setting a state revokes the previous
/// one before touching the LEDs.
pub struct BlinkScheduler {
    panel: Arc<dyn FrontPanel>,
    interval: Duration,
    running: Mutex<Option<Blink>>,
}

impl BlinkScheduler {
    #[must_use]
    pub fn new(panel: Arc<dyn FrontPanel>, interval: Duration) -> Self {
        Self {
            panel,
            interval,
            running: Mutex::new(None),
        }
    }

    /// Show `state`: revoke any running pattern, apply step 0, and for
    /// blinking states schedule steps 1, 2, ... every interval.
    ///
    /// Returns whether the panel accepted step 0. No pattern is scheduled
    /// when it did not.
    pub fn set_state(&self, state: FrontPanelState) -> Result<bool> {
        self.revoke();

        let did_set = apply_lights(self.panel.as_ref(), lights_for(state, 0));
        if !did_set || !state.blinks() {
            return Ok(did_set);
        }

        let (stop, stopped) = bounded::<()>(1);
        let panel = Arc::clone(&self.panel);
        let interval = self.interval;
        let handle = thread::Builder::new()
            .name("whm-front-panel".to_string())
            .spawn(move || {
                let mut iteration: u32 = 1;
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            apply_lights(panel.as_ref(), lights_for(state, iteration));
                            iteration = iteration.wrapping_add(1);
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|source| WhmError::Runtime {
                details: format!("failed to spawn front panel thread: {source}"),
            })?;

        *self.running.lock() = Some(Blink {
            state,
            stop,
            handle,
        });
        Ok(true)
    }

    /// State whose pattern is currently animating, if any.
    #[must_use]
    pub fn active_state(&self) -> Option<FrontPanelState> {
        self.running.lock().as_ref().map(|blink| blink.state)
    }

    /// Stop the running pattern and wait for its thread.
    pub fn revoke(&self) {
        let blink = self.running.lock().take();
        if let Some(blink) = blink {
            let _ = blink.stop.try_send(());
            drop(blink.stop);
            if blink.handle.join().is_err() {
                eprintln!("[WHM-PANEL] front panel thread panicked");
            }
        }
    }
}

impl Drop for BlinkScheduler {
    fn drop(&mut self) {
        self.revoke();
    }
}
