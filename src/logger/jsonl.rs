//! Append-only JSONL activity log.
//!
//! Every maintenance operation leaves one self-contained JSON line. Lines are
//! assembled in memory and written with a single `write_all` so a concurrent
//! `tail -f` never sees a torn record.
//!
//! When the log cannot be written the writer degrades instead of failing the
//! operation: primary path, then fallback path (RAM-backed `/tmp` by default),
//! then stderr with a `[WHM-JSONL]` prefix, then silent discard.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions, rename};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, WhmError};
use crate::core::paths;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Maintenance operations recorded in the activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    LightReset,
    InternalReset,
    FactoryReset,
    CleanCheck,
    DeviceInfo,
    FrontPanel,
    Error,
}

/// One activity record. Only `ts`, `event`, and `severity` are always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 UTC timestamp with millisecond precision.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    /// Script text as dispatched (after placeholder substitution).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean: Option<bool>,
    /// Objects that made a clean check fail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_secs: Option<u64>,
    /// Front-panel state code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppress_reboot: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Create a new entry stamped with the current UTC time.
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: format_utc_now(),
            event,
            severity,
            ok: None,
            script: None,
            clean: None,
            files: None,
            age_secs: None,
            state: None,
            suppress_reboot: None,
            duration_ms: None,
            config_hash: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }

    /// Mark the outcome; failures carry the error code and message and raise
    /// the severity to warning.
    #[must_use]
    pub fn with_outcome(mut self, outcome: std::result::Result<(), &WhmError>) -> Self {
        match outcome {
            Ok(()) => self.ok = Some(true),
            Err(err) => {
                self.ok = Some(false);
                self.error_code = Some(err.code().to_string());
                self.error_message = Some(err.message());
                if self.severity == Severity::Info {
                    self.severity = Severity::Warning;
                }
            }
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Normal,
    Fallback,
    Stderr,
    Discard,
}

#[derive(Debug, Clone)]
pub struct JsonlConfig {
    pub path: PathBuf,
    /// Used when `path` cannot be opened or written.
    pub fallback_path: Option<PathBuf>,
    /// Size at which the current file is rotated. Default: 1 MiB.
    pub max_size_bytes: u64,
    /// Rotated generations kept (`.1` newest). Default: 3.
    pub max_rotated_files: u32,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(paths::ACTIVITY_LOG_FILE),
            fallback_path: Some(PathBuf::from(paths::ACTIVITY_LOG_FALLBACK)),
            max_size_bytes: 1024 * 1024,
            max_rotated_files: 3,
        }
    }
}

impl JsonlConfig {
    /// Default limits with `path` as the primary file.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// Append-only JSONL writer with size rotation and a degradation chain.
pub struct JsonlWriter {
    config: JsonlConfig,
    writer: Option<BufWriter<File>>,
    state: WriterState,
    bytes_written: u64,
}

impl JsonlWriter {
    /// Open the log, falling through the degradation chain on failure.
    pub fn open(config: JsonlConfig) -> Self {
        let mut w = Self {
            config,
            writer: None,
            state: WriterState::Discard,
            bytes_written: 0,
        };
        w.try_open_primary();
        w
    }

    /// Writer that drops everything.
    #[must_use]
    pub fn discard() -> Self {
        Self {
            config: JsonlConfig {
                fallback_path: None,
                ..JsonlConfig::default()
            },
            writer: None,
            state: WriterState::Discard,
            bytes_written: 0,
        }
    }

    /// Write `entry` as one line and flush it.
    ///
    /// Records are rare and must survive a reboot issued right after them,
    /// so every entry is flushed and synced.
    pub fn write_entry(&mut self, entry: &LogEntry) {
        let line = match serde_json::to_string(entry) {
            Ok(json) => format!("{json}\n"),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[WHM-JSONL] serialize error: {e}");
                return;
            }
        };
        self.write_line(&line);
        self.sync();
    }

    pub fn state(&self) -> &'static str {
        match self.state {
            WriterState::Normal => "normal",
            WriterState::Fallback => "fallback",
            WriterState::Stderr => "stderr",
            WriterState::Discard => "discard",
        }
    }

    /// Path currently written to, if any.
    pub fn active_path(&self) -> Option<&Path> {
        match self.state {
            WriterState::Normal => Some(&self.config.path),
            WriterState::Fallback => self.config.fallback_path.as_deref(),
            WriterState::Stderr | WriterState::Discard => None,
        }
    }

    fn sync(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
            let _ = w.get_ref().sync_data();
        }
    }

    fn write_line(&mut self, line: &str) {
        if self.bytes_written + line.len() as u64 > self.config.max_size_bytes
            && matches!(self.state, WriterState::Normal | WriterState::Fallback)
        {
            self.rotate();
        }

        match self.state {
            WriterState::Normal | WriterState::Fallback => {
                let written = self
                    .writer
                    .as_mut()
                    .is_some_and(|w| w.write_all(line.as_bytes()).is_ok());
                if written {
                    self.bytes_written += line.len() as u64;
                } else {
                    self.degrade();
                    self.write_line(line);
                }
            }
            WriterState::Stderr => {
                let _ = write!(io::stderr(), "[WHM-JSONL] {line}");
            }
            WriterState::Discard => {}
        }
    }

    fn try_open_primary(&mut self) {
        match open_append(&self.config.path) {
            Ok((file, size)) => {
                self.writer = Some(BufWriter::new(file));
                self.state = WriterState::Normal;
                self.bytes_written = size;
            }
            Err(_) => self.try_open_fallback(),
        }
    }

    fn try_open_fallback(&mut self) {
        let Some(fallback) = self.config.fallback_path.clone() else {
            self.state = WriterState::Stderr;
            let _ = writeln!(
                io::stderr(),
                "[WHM-JSONL] {} unavailable and no fallback configured, using stderr",
                self.config.path.display()
            );
            return;
        };
        match open_append(&fallback) {
            Ok((file, size)) => {
                let _ = writeln!(
                    io::stderr(),
                    "[WHM-JSONL] {} unavailable, using fallback {}",
                    self.config.path.display(),
                    fallback.display()
                );
                self.writer = Some(BufWriter::new(file));
                self.state = WriterState::Fallback;
                self.bytes_written = size;
            }
            Err(_) => {
                self.state = WriterState::Stderr;
                let _ = writeln!(
                    io::stderr(),
                    "[WHM-JSONL] primary and fallback logs unavailable, using stderr"
                );
            }
        }
    }

    fn degrade(&mut self) {
        self.writer = None;
        match self.state {
            WriterState::Normal => self.try_open_fallback(),
            WriterState::Fallback => {
                self.state = WriterState::Stderr;
                let _ = writeln!(io::stderr(), "[WHM-JSONL] fallback write failed, using stderr");
            }
            WriterState::Stderr => self.state = WriterState::Discard,
            WriterState::Discard => {}
        }
    }

    fn rotate(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
        }
        self.writer = None;

        let Some(base) = self.active_path().map(Path::to_path_buf) else {
            return;
        };

        // .N is dropped, .N-1 → .N, …, current → .1
        let _ = fs::remove_file(rotated_name(&base, self.config.max_rotated_files));
        for i in (1..self.config.max_rotated_files).rev() {
            let _ = rename(rotated_name(&base, i), rotated_name(&base, i + 1));
        }
        let _ = rename(&base, rotated_name(&base, 1));

        match open_append(&base) {
            Ok((file, _)) => {
                self.writer = Some(BufWriter::new(file));
                self.bytes_written = 0;
            }
            Err(_) => self.degrade(),
        }
    }
}

/// Open or create `path` for appending. Returns the file and its current size.
fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| WhmError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| WhmError::io(path, source))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, size))
}

/// `activity.jsonl` → `activity.jsonl.3`.
fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(path: &Path) -> JsonlConfig {
        JsonlConfig {
            path: path.to_path_buf(),
            fallback_path: None,
            max_size_bytes: 1024 * 1024,
            max_rotated_files: 3,
        }
    }

    #[test]
    fn entries_are_single_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.jsonl");
        let mut writer = JsonlWriter::open(config(&path));

        let mut entry = LogEntry::new(EventType::CleanCheck, Severity::Info);
        entry.clean = Some(false);
        entry.files = Some(vec!["/opt/netflix/cache.db".to_string()]);
        writer.write_entry(&entry);
        writer.write_entry(&LogEntry::new(EventType::LightReset, Severity::Info));

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "clean_check");
        assert_eq!(first["severity"], "info");
        assert_eq!(first["clean"], false);
        assert_eq!(first["files"][0], "/opt/netflix/cache.db");
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["event"], "light_reset");
    }

    #[test]
    fn unset_fields_are_omitted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sparse.jsonl");
        let mut writer = JsonlWriter::open(config(&path));
        writer.write_entry(&LogEntry::new(EventType::DeviceInfo, Severity::Info));

        let line = fs::read_to_string(&path).unwrap();
        assert!(!line.contains("\"script\""));
        assert!(!line.contains("\"files\""));
        assert!(!line.contains("\"error_code\""));
    }

    #[test]
    fn failure_outcome_carries_code_and_raises_severity() {
        let err = WhmError::Refused {
            reason: "version is PROD".to_string(),
        };
        let entry =
            LogEntry::new(EventType::InternalReset, Severity::Info).with_outcome(Err(&err));
        assert_eq!(entry.ok, Some(false));
        assert_eq!(entry.severity, Severity::Warning);
        assert_eq!(entry.error_code.as_deref(), Some("WHM-3002"));
        assert_eq!(entry.error_message.as_deref(), Some("version is PROD"));

        let entry = LogEntry::new(EventType::LightReset, Severity::Info).with_outcome(Ok(()));
        assert_eq!(entry.ok, Some(true));
        assert_eq!(entry.severity, Severity::Info);
    }

    #[test]
    fn rotation_keeps_bounded_generations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rot.jsonl");
        let mut writer = JsonlWriter::open(JsonlConfig {
            max_size_bytes: 100,
            ..config(&path)
        });

        for _ in 0..12 {
            writer.write_entry(&LogEntry::new(EventType::FrontPanel, Severity::Info));
        }

        assert!(path.exists());
        assert!(rotated_name(&path, 1).exists());
        assert!(rotated_name(&path, 3).exists());
        assert!(!rotated_name(&path, 4).exists());
    }

    #[test]
    fn falls_back_when_primary_unwritable() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = dir.path().join("fallback.jsonl");
        let mut writer = JsonlWriter::open(JsonlConfig {
            fallback_path: Some(fallback.clone()),
            ..config(Path::new("/nonexistent_whm_test_dir_4821/activity.jsonl"))
        });

        assert_eq!(writer.state(), "fallback");
        assert_eq!(writer.active_path(), Some(fallback.as_path()));
        writer.write_entry(&LogEntry::new(EventType::Error, Severity::Warning));
        assert!(!fs::read_to_string(&fallback).unwrap().is_empty());
    }

    #[test]
    fn discard_writer_accepts_entries() {
        let mut writer = JsonlWriter::discard();
        assert_eq!(writer.state(), "discard");
        assert!(writer.active_path().is_none());
        writer.write_entry(&LogEntry::new(EventType::Error, Severity::Critical));
    }

    #[test]
    fn reopen_appends_to_existing_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.jsonl");
        JsonlWriter::open(config(&path))
            .write_entry(&LogEntry::new(EventType::LightReset, Severity::Info));
        JsonlWriter::open(config(&path))
            .write_entry(&LogEntry::new(EventType::CleanCheck, Severity::Info));

        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
    }
}
