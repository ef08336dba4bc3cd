#![forbid(unsafe_code)]

//! Warehouse maintenance (whm) is a device-maintenance service for set-top boxes
//! leaving the warehouse.
//!
//! Covers:
//! 1. **Resets**: light reset via a placeholder-resolved script, internal
//!    reset on test images, factory reset through the power manager
//! 2. **Clean-state audit**: checks that customer data listed in the audit
//!    list is gone from the filesystem
//! 3. **Device signaling**: device details and front-panel download states
//!
//! # Library usage
//!
//! ```rust,no_run
//! use warehouse_maintenance::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use warehouse_maintenance::core::config::Config;
//! use warehouse_maintenance::scanner::audit::AuditScanner;
//! ```

pub mod prelude;

pub mod core;
#[cfg(feature = "daemon")]
pub mod daemon;
pub mod device;
pub mod logger;
pub mod platform;
pub mod reset;
pub mod scanner;
pub mod service;
