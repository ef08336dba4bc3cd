//! Configuration system: TOML file + env var overrides + device defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, WhmError};
use crate::core::paths;

/// Full service configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub reset: ResetConfig,
    pub device_info: DeviceInfoConfig,
    pub audit: AuditConfig,
    pub front_panel: FrontPanelConfig,
}

/// On-device file locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    /// Path-pattern list consumed by the clean check.
    pub audit_list: PathBuf,
    /// Shell-sourceable `NAME=value` file used to resolve pattern variables.
    pub device_properties: PathBuf,
    /// Image version file inspected before an internal reset.
    pub version_file: PathBuf,
    pub activity_log: PathBuf,
}

/// Reset script templates and dispatch limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ResetConfig {
    pub light_reset_template: String,
    pub internal_reset_script: String,
    /// Scripts must be strictly shorter than this many bytes.
    pub max_script_len: usize,
    /// Block device whose mount point backs `SD_CARD_MOUNT_PATH`.
    pub sd_card_device: String,
    /// Command invoked for a full warehouse (factory) reset. `None` means the
    /// device has no power manager integration.
    pub power_reset_command: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeviceInfoConfig {
    pub script: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AuditConfig {
    /// Upper bound on wildcard matches reported per pattern.
    pub max_matches_per_pattern: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FrontPanelConfig {
    /// Delay between blink-pattern steps.
    pub interval_ms: u64,
    /// Root of the LED class devices.
    pub leds_dir: PathBuf,
    /// LED under `leds_dir` driving the message (data) indicator.
    pub message_led: Option<String>,
    /// LED under `leds_dir` driving the record indicator.
    pub record_led: Option<String>,
}

impl FrontPanelConfig {
    /// Whether both indicators are wired up.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.message_led.is_some() && self.record_led.is_some()
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from(paths::DEFAULT_CONFIG_FILE),
            audit_list: PathBuf::from(paths::AUDIT_LIST_FILE),
            device_properties: PathBuf::from(paths::DEVICE_PROPERTIES_FILE),
            version_file: PathBuf::from(paths::VERSION_FILE),
            activity_log: PathBuf::from(paths::ACTIVITY_LOG_FILE),
        }
    }
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            light_reset_template: paths::LIGHT_RESET_TEMPLATE.to_string(),
            internal_reset_script: paths::INTERNAL_RESET_SCRIPT.to_string(),
            max_script_len: 2048,
            sd_card_device: "mmcblk0p1".to_string(),
            power_reset_command: None,
        }
    }
}

impl Default for DeviceInfoConfig {
    fn default() -> Self {
        Self {
            script: paths::DEVICE_INFO_SCRIPT.to_string(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_matches_per_pattern: 10,
        }
    }
}

impl Default for FrontPanelConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            leds_dir: PathBuf::from("/sys/class/leds"),
            message_led: None,
            record_led: None,
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| WhmError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(WhmError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for activity logging.
    ///
    /// FNV-1a over canonical JSON, stable across processes and releases.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // paths
        if let Some(raw) = lookup("WHM_AUDIT_LIST") {
            self.paths.audit_list = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("WHM_DEVICE_PROPERTIES") {
            self.paths.device_properties = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("WHM_VERSION_FILE") {
            self.paths.version_file = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("WHM_ACTIVITY_LOG") {
            self.paths.activity_log = PathBuf::from(raw);
        }

        // reset
        if let Some(raw) = lookup("WHM_SD_CARD_DEVICE") {
            self.reset.sd_card_device = raw;
        }
        if let Some(raw) = lookup("WHM_SCRIPT_MAX_LEN") {
            self.reset.max_script_len = parse_env_usize("WHM_SCRIPT_MAX_LEN", &raw)?;
        }
        if let Some(raw) = lookup("WHM_POWER_RESET_COMMAND") {
            self.reset.power_reset_command = Some(raw);
        }

        // audit
        if let Some(raw) = lookup("WHM_AUDIT_MAX_MATCHES") {
            self.audit.max_matches_per_pattern = parse_env_usize("WHM_AUDIT_MAX_MATCHES", &raw)?;
        }

        // front panel
        if let Some(raw) = lookup("WHM_FRONT_PANEL_INTERVAL_MS") {
            self.front_panel.interval_ms = parse_env_u64("WHM_FRONT_PANEL_INTERVAL_MS", &raw)?;
        }
        if let Some(raw) = lookup("WHM_LEDS_DIR") {
            self.front_panel.leds_dir = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("WHM_MESSAGE_LED") {
            self.front_panel.message_led = Some(raw);
        }
        if let Some(raw) = lookup("WHM_RECORD_LED") {
            self.front_panel.record_led = Some(raw);
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.reset.light_reset_template.trim().is_empty() {
            return Err(WhmError::InvalidConfig {
                details: "reset.light_reset_template must not be empty".to_string(),
            });
        }
        if self.reset.internal_reset_script.trim().is_empty() {
            return Err(WhmError::InvalidConfig {
                details: "reset.internal_reset_script must not be empty".to_string(),
            });
        }
        if self.reset.max_script_len < 2 {
            return Err(WhmError::InvalidConfig {
                details: format!(
                    "reset.max_script_len must be >= 2, got {}",
                    self.reset.max_script_len
                ),
            });
        }
        // Embedded verbatim into the mount-table helper command.
        let device = &self.reset.sd_card_device;
        if device.is_empty()
            || !device
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(WhmError::InvalidConfig {
                details: format!("reset.sd_card_device must match [A-Za-z0-9_-]+, got {device:?}"),
            });
        }
        if self
            .reset
            .power_reset_command
            .as_deref()
            .is_some_and(|cmd| cmd.trim().is_empty())
        {
            return Err(WhmError::InvalidConfig {
                details: "reset.power_reset_command must not be blank when set".to_string(),
            });
        }
        if self.device_info.script.trim().is_empty() {
            return Err(WhmError::InvalidConfig {
                details: "device_info.script must not be empty".to_string(),
            });
        }
        if self.audit.max_matches_per_pattern == 0 {
            return Err(WhmError::InvalidConfig {
                details: "audit.max_matches_per_pattern must be >= 1".to_string(),
            });
        }
        if self.front_panel.interval_ms == 0 {
            return Err(WhmError::InvalidConfig {
                details: "front_panel.interval_ms must be >= 1".to_string(),
            });
        }
        for (key, led) in [
            ("front_panel.message_led", &self.front_panel.message_led),
            ("front_panel.record_led", &self.front_panel.record_led),
        ] {
            if let Some(name) = led
                && (name.is_empty() || name.contains('/') || name == "." || name == "..")
            {
                return Err(WhmError::InvalidConfig {
                    details: format!("{key} must be a single LED name, got {name:?}"),
                });
            }
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.parse::<u64>().map_err(|error| WhmError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

fn parse_env_usize(name: &str, raw: &str) -> Result<usize> {
    raw.parse::<usize>().map_err(|error| WhmError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}
