//! WHM-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, WhmError>;

/// Top-level error type for the warehouse maintenance service.
#[derive(Debug, Error)]
pub enum WhmError {
    #[error("[WHM-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[WHM-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[WHM-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[WHM-1101] Can't open file {path}")]
    MissingAuditList { path: PathBuf },

    #[error("[WHM-1102] file {path} doesn't have any lines with paths")]
    EmptyAuditList { path: PathBuf },

    #[error("[WHM-2001] {details}")]
    ScriptFailed { status: i32, details: String },

    #[error("[WHM-2002] Length of script greater than allowed limit of {limit}.")]
    ScriptTooLong { limit: usize },

    #[error("[WHM-2003] failed to run {command}: {source}")]
    Exec {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[WHM-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[WHM-3001] {capability} unsupported")]
    Unsupported { capability: &'static str },

    #[error("[WHM-3002] {reason}")]
    Refused { reason: String },

    #[error("[WHM-3003] {details}")]
    InvalidParameter { details: String },

    #[error("[WHM-3101] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[WHM-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl WhmError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "WHM-1001",
            Self::MissingConfig { .. } => "WHM-1002",
            Self::ConfigParse { .. } => "WHM-1003",
            Self::MissingAuditList { .. } => "WHM-1101",
            Self::EmptyAuditList { .. } => "WHM-1102",
            Self::ScriptFailed { .. } => "WHM-2001",
            Self::ScriptTooLong { .. } => "WHM-2002",
            Self::Exec { .. } => "WHM-2003",
            Self::Serialization { .. } => "WHM-2101",
            Self::Unsupported { .. } => "WHM-3001",
            Self::Refused { .. } => "WHM-3002",
            Self::InvalidParameter { .. } => "WHM-3003",
            Self::Io { .. } => "WHM-3101",
            Self::Runtime { .. } => "WHM-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    ///
    /// Script failures are reported, never retried automatically.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Exec { .. } | Self::Runtime { .. })
    }

    /// Human-readable message without the `[WHM-NNNN]` prefix, suitable for
    /// the `error` field of a handler response.
    #[must_use]
    pub fn message(&self) -> String {
        let full = self.to_string();
        match full.split_once("] ") {
            Some((prefix, rest)) if prefix.starts_with("[WHM-") => rest.to_string(),
            _ => full,
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for process-spawn failures.
    #[must_use]
    pub fn exec(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::Exec {
            command: command.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for WhmError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for WhmError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
