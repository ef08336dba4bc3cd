//! Core types: errors, configuration, well-known device paths.

pub mod config;
pub mod errors;
pub mod paths;
