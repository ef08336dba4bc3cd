//! The warehouse maintenance service: one entry point per operation.
//!
//! Handlers never return errors to the host. Each produces a serializable
//! response whose `success` flag and `error` message describe the outcome, and
//! each leaves one record in the activity log.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::core::config::Config;
use crate::core::errors::{Result, WhmError};
use crate::device::front_panel::{BlinkScheduler, FrontPanel, FrontPanelState, SysfsFrontPanel};
use crate::device::info::collect_device_info;
use crate::logger::activity::ActivityLog;
use crate::logger::jsonl::{EventType, JsonlConfig, LogEntry, Severity};
use crate::platform::pal::{Platform, detect_platform};
use crate::reset::script::{internal_reset, light_reset, render_light_reset};
use crate::reset::template::{RenderedScript, TemplateResolver};
use crate::scanner::audit::{AuditResult, AuditScanner};
use crate::service::events::{DEVICE_INFO_RETRIEVED, EventSink};
use crate::service::power::{CommandPowerManager, PowerManager, UnsupportedPowerManager};
use crate::service::worker::ResetWorker;

/// `{ success, error? }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// `WHM-NNNN` code of the failure, for exit-status mapping.
    #[serde(skip)]
    pub code: Option<&'static str>,
}

impl Response {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            code: None,
        }
    }

    #[must_use]
    pub fn failed(err: &WhmError) -> Self {
        Self {
            success: false,
            error: Some(err.message()),
            code: Some(err.code()),
        }
    }

    fn from_result<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(err) => Self::failed(err),
        }
    }
}

/// Device details flattened next to `success`.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfoResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub properties: BTreeMap<String, String>,
}

/// Result of the clean check.
#[derive(Debug, Clone, Serialize)]
pub struct CleanResponse {
    pub success: bool,
    /// Objects still present; empty when the device is clean.
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Per-pattern detail for callers that want to report it.
    #[serde(skip)]
    pub audit: Option<AuditResult>,
}

/// Everything the service needs, injected.
pub struct WarehouseParts {
    pub config: Config,
    pub platform: Arc<dyn Platform>,
    pub power: Arc<dyn PowerManager>,
    pub front_panel: Option<Arc<dyn FrontPanel>>,
    pub events: Arc<dyn EventSink>,
    pub log: ActivityLog,
}

pub struct Warehouse {
    config: Config,
    config_hash: Option<String>,
    platform: Arc<dyn Platform>,
    events: Arc<dyn EventSink>,
    log: ActivityLog,
    resets: ResetWorker,
    front_panel: Option<BlinkScheduler>,
}

impl Warehouse {
    #[must_use]
    pub fn new(parts: WarehouseParts) -> Self {
        let WarehouseParts {
            config,
            platform,
            power,
            front_panel,
            events,
            log,
        } = parts;
        let interval = Duration::from_millis(config.front_panel.interval_ms);
        Self {
            config_hash: config.stable_hash().ok(),
            resets: ResetWorker::new(power, Arc::clone(&events), log.clone()),
            front_panel: front_panel.map(|panel| BlinkScheduler::new(panel, interval)),
            config,
            platform,
            events,
            log,
        }
    }

    /// Wire the service to the real device described by `config`.
    pub fn from_config(config: Config, events: Arc<dyn EventSink>) -> Result<Self> {
        let platform = detect_platform(&config)?;
        let power: Arc<dyn PowerManager> = match &config.reset.power_reset_command {
            Some(command) => Arc::new(CommandPowerManager::new(Arc::clone(&platform), command)),
            None => Arc::new(UnsupportedPowerManager),
        };
        let front_panel = SysfsFrontPanel::from_config(&config.front_panel)
            .map(|panel| Arc::new(panel) as Arc<dyn FrontPanel>);
        let log = ActivityLog::open(JsonlConfig::at(&config.paths.activity_log));
        Ok(Self::new(WarehouseParts {
            config,
            platform,
            power,
            front_panel,
            events,
            log,
        }))
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start a factory reset in the background. `success` only reports that
    /// the request was accepted; the outcome arrives as `resetDone`.
    pub fn reset_device(&self, suppress_reboot: bool) -> Response {
        let result = self.resets.request(suppress_reboot);
        if let Err(err) = &result {
            let mut entry = self.entry(EventType::FactoryReset).with_outcome(Err(err));
            entry.suppress_reboot = Some(suppress_reboot);
            self.log.record(&entry);
        }
        Response::from_result(&result)
    }

    /// Block until a factory reset started by [`reset_device`](Self::reset_device) finishes.
    pub fn wait_for_reset(&self) {
        self.resets.wait();
    }

    pub fn get_device_info(&self) -> DeviceInfoResponse {
        let started = Instant::now();
        let collected = collect_device_info(self.platform.as_ref(), &self.config.device_info.script);

        let (response, outcome) = match collected {
            Ok(info) => {
                let error = info.failure.clone();
                let outcome = match &error {
                    Some(details) => Err(WhmError::ScriptFailed {
                        status: -1,
                        details: details.clone(),
                    }),
                    None => Ok(()),
                };
                (
                    DeviceInfoResponse {
                        success: error.is_none(),
                        error,
                        properties: info.properties,
                    },
                    outcome,
                )
            }
            Err(err) => (
                DeviceInfoResponse {
                    success: false,
                    error: Some(err.message()),
                    properties: BTreeMap::new(),
                },
                Err(err),
            ),
        };

        let mut entry = self
            .entry(EventType::DeviceInfo)
            .with_outcome(outcome.as_ref().map(|_| ()));
        entry.duration_ms = elapsed_ms(started);
        self.log.record(&entry);

        if response.success {
            match serde_json::to_value(&response.properties) {
                Ok(payload) => self.events.notify(DEVICE_INFO_RETRIEVED, payload),
                Err(err) => eprintln!("[WHM-SERVICE] failed to encode device info: {err}"),
            }
        }
        response
    }

    /// Show a download state (`-1` none, `1` in progress, `3` failed).
    pub fn set_front_panel_state(&self, code: i32) -> Response {
        let result = self.apply_front_panel(code);
        let mut entry = self
            .entry(EventType::FrontPanel)
            .with_outcome(result.as_ref().map(|_| ()));
        entry.state = Some(code);
        self.log.record(&entry);
        Response::from_result(&result)
    }

    fn apply_front_panel(&self, code: i32) -> Result<()> {
        let state = FrontPanelState::try_from(code)?;
        let scheduler = self.front_panel.as_ref().ok_or(WhmError::Unsupported {
            capability: "front panel",
        })?;
        if scheduler.set_state(state)? {
            Ok(())
        } else {
            Err(WhmError::Runtime {
                details: "front panel not set".to_string(),
            })
        }
    }

    /// State currently animating on the front panel, if any.
    #[must_use]
    pub fn front_panel_state(&self) -> Option<FrontPanelState> {
        self.front_panel.as_ref().and_then(BlinkScheduler::active_state)
    }

    pub fn internal_reset(&self, pass_phrase: &str) -> Response {
        let result = internal_reset(
            self.platform.as_ref(),
            &self.config.reset,
            &self.config.paths.version_file,
            pass_phrase,
        );
        let mut entry = self
            .entry(EventType::InternalReset)
            .with_outcome(result.as_ref().map(|_| ()));
        entry.severity = Severity::Critical;
        if result.is_ok() {
            entry.script = Some(self.config.reset.internal_reset_script.clone());
        }
        self.log.record(&entry);
        Response::from_result(&result)
    }

    /// Resolve and run the light (customer data) reset.
    pub fn light_reset(&self) -> Response {
        let started = Instant::now();
        let result = light_reset(self.platform.as_ref(), &self.config.reset);
        let mut entry = self
            .entry(EventType::LightReset)
            .with_outcome(result.as_ref().map(|_| ()));
        entry.duration_ms = elapsed_ms(started);
        if let Ok(report) = &result {
            entry.script = Some(report.rendered.script.clone());
        }
        self.log.record(&entry);
        if let Err(err) = &result {
            eprintln!("[WHM-SERVICE] light reset failed: {}", err.message());
        }
        Response::from_result(&result)
    }

    /// The light-reset script as it would be dispatched now.
    pub fn render_light_reset(&self) -> Result<RenderedScript> {
        render_light_reset(self.platform.as_ref(), &self.config.reset)
    }

    /// Resolve placeholders in an arbitrary `template`.
    pub fn render_template(&self, template: &str) -> Result<RenderedScript> {
        let resolver =
            TemplateResolver::new(self.platform.as_ref(), &self.config.reset.sd_card_device)?;
        Ok(resolver.render(template))
    }

    /// Report leftover customer data.
    ///
    /// A negative `age_secs` checks existence only; otherwise an object counts
    /// only when it was modified more than `age_secs` seconds ago.
    pub fn is_clean(&self, age_secs: i64) -> CleanResponse {
        let started = Instant::now();
        let age = u64::try_from(age_secs).ok().map(Duration::from_secs);
        let scanner = AuditScanner::new(self.platform.as_ref())
            .with_max_matches(self.config.audit.max_matches_per_pattern);
        let result = scanner.scan_file(&self.config.paths.audit_list, age);

        let mut entry = self
            .entry(EventType::CleanCheck)
            .with_outcome(result.as_ref().map(|_| ()));
        entry.duration_ms = elapsed_ms(started);
        entry.age_secs = age.map(|a| a.as_secs());

        let response = match result {
            Ok(audit) => {
                let files = audit.files();
                entry.clean = Some(audit.clean());
                entry.files = Some(files.clone());
                CleanResponse {
                    success: true,
                    clean: Some(audit.clean()),
                    files,
                    error: None,
                    audit: Some(audit),
                }
            }
            Err(err) => CleanResponse {
                success: false,
                files: Vec::new(),
                // An unreadable list can never prove the device clean.
                clean: matches!(err, WhmError::MissingAuditList { .. }).then_some(false),
                error: Some(err.message()),
                audit: None,
            },
        };
        self.log.record(&entry);
        response
    }

    fn entry(&self, event: EventType) -> LogEntry {
        let mut entry = LogEntry::new(event, Severity::Info);
        entry.config_hash.clone_from(&self.config_hash);
        entry
    }
}

fn elapsed_ms(started: Instant) -> Option<u64> {
    u64::try_from(started.elapsed().as_millis()).ok()
}
