//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use warehouse_maintenance::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{Result, WhmError};

// Platform
pub use crate::platform::pal::{MockPlatform, ObjectStat, Platform, ShellOutput, detect_platform};

// Scanner
pub use crate::scanner::audit::{AuditResult, AuditScanner, PatternStatus};
pub use crate::scanner::patterns::{load_audit_list, parse_audit_list};

// Reset
pub use crate::reset::script::ScriptRunner;
pub use crate::reset::template::{RenderedScript, TemplateResolver};

// Device
pub use crate::device::front_panel::{BlinkScheduler, FrontPanel, FrontPanelState};
pub use crate::device::info::DeviceInfo;

// Service
pub use crate::service::events::{Event, EventSink};
pub use crate::service::power::PowerManager;
pub use crate::service::warehouse::{Response, Warehouse};

// Logging
pub use crate::logger::activity::ActivityLog;
