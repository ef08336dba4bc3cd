//! Power-manager integration for full warehouse (factory) resets.

#![allow(missing_docs)]

use std::sync::Arc;

use crate::core::errors::{Result, WhmError};
use crate::platform::pal::Platform;

/// Performs the platform's warehouse reset.
pub trait PowerManager: Send + Sync {
    /// Reset the device; with `suppress_reboot` the device stays up afterwards.
    fn warehouse_reset(&self, suppress_reboot: bool) -> Result<()>;
}

/// Delegates the reset to a configured shell command.
///
/// The command sees `WHM_SUPPRESS_REBOOT=1` or `0` in its environment.
pub struct CommandPowerManager {
    platform: Arc<dyn Platform>,
    command: String,
}

impl CommandPowerManager {
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>, command: impl Into<String>) -> Self {
        Self {
            platform,
            command: command.into(),
        }
    }

    #[must_use]
    pub fn command_line(&self, suppress_reboot: bool) -> String {
        format!(
            "export WHM_SUPPRESS_REBOOT={}; {}",
            u8::from(suppress_reboot),
            self.command
        )
    }
}

impl PowerManager for CommandPowerManager {
    fn warehouse_reset(&self, suppress_reboot: bool) -> Result<()> {
        let output = self.platform.run_shell(&self.command_line(suppress_reboot))?;
        if output.success() {
            Ok(())
        } else {
            Err(WhmError::ScriptFailed {
                status: output.status,
                details: format!("script returned: {}", output.status),
            })
        }
    }
}

/// Stand-in for devices without a power manager.
pub struct UnsupportedPowerManager;

impl PowerManager for UnsupportedPowerManager {
    fn warehouse_reset(&self, _suppress_reboot: bool) -> Result<()> {
        Err(WhmError::Unsupported {
            capability: "power manager",
        })
    }
}
