//! Clean-state audit: resolve each audit-list pattern to concrete paths and
//! report which of them are still present on the device.
//!
//! The scan is a pure function of its platform responses: it keeps no state
//! between invocations and walks the patterns strictly in input order.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, WhmError};
use crate::platform::pal::Platform;
use crate::scanner::patterns::{
    FindQuery, expand_variables, extract_variable, has_wildcard, load_audit_list,
};

/// Default cap on wildcard matches per pattern.
pub const DEFAULT_MAX_MATCHES: usize = 10;

/// A concrete path checked during the audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedObject {
    pub path: PathBuf,
    pub exists: bool,
    /// Set only when the scan ran with an age threshold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub older_than_threshold: Option<bool>,
}

/// What happened to a single pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PatternStatus {
    /// The pattern's variable resolved empty; nothing was checked.
    Untested { variable: String },
    /// Wildcard expansion produced no candidates.
    NoMatches,
    /// Objects were checked; includes absent ones.
    Checked { objects: Vec<MatchedObject> },
}

/// Per-pattern record kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternOutcome {
    pub pattern: String,
    #[serde(flatten)]
    pub status: PatternStatus,
}

/// Aggregate audit result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditResult {
    /// Patterns processed, including untested ones.
    pub total_patterns: usize,
    /// Individual objects examined, plus one per untested or empty pattern.
    pub objects_checked: usize,
    /// Objects found present, in pattern order.
    pub matched: Vec<MatchedObject>,
    pub outcomes: Vec<PatternOutcome>,
}

impl AuditResult {
    /// `true` when no audited object remains on the device.
    #[must_use]
    pub fn clean(&self) -> bool {
        self.matched.is_empty()
    }

    /// Paths of present objects, in report order.
    #[must_use]
    pub fn files(&self) -> Vec<String> {
        self.matched
            .iter()
            .map(|object| object.path.to_string_lossy().into_owned())
            .collect()
    }
}

/// Audits path patterns against the device filesystem.
pub struct AuditScanner<'a> {
    platform: &'a dyn Platform,
    max_matches: usize,
}

impl<'a> AuditScanner<'a> {
    pub fn new(platform: &'a dyn Platform) -> Self {
        Self {
            platform,
            max_matches: DEFAULT_MAX_MATCHES,
        }
    }

    #[must_use]
    pub fn with_max_matches(mut self, max_matches: usize) -> Self {
        self.max_matches = max_matches.max(1);
        self
    }

    /// Load the audit list at `list_path` and scan it.
    pub fn scan_file(&self, list_path: &Path, age: Option<Duration>) -> Result<AuditResult> {
        let patterns = load_audit_list(list_path)?;
        self.scan(&patterns, age)
    }

    /// Scan `patterns` in order. With `age`, an object only counts as present
    /// when it was last modified longer ago than the threshold.
    pub fn scan<S: AsRef<str>>(&self, patterns: &[S], age: Option<Duration>) -> Result<AuditResult> {
        if patterns.is_empty() {
            return Err(WhmError::InvalidConfig {
                details: "no path patterns to audit".to_string(),
            });
        }

        let mut result = AuditResult {
            total_patterns: 0,
            objects_checked: 0,
            matched: Vec::new(),
            outcomes: Vec::with_capacity(patterns.len()),
        };
        // Variable values are stable for the duration of one scan.
        let mut values: HashMap<String, String> = HashMap::new();

        for pattern in patterns {
            let pattern = pattern.as_ref();
            result.total_patterns += 1;
            let status = self.scan_pattern(pattern, age, &mut values)?;
            match &status {
                PatternStatus::Untested { .. } | PatternStatus::NoMatches => {
                    result.objects_checked += 1;
                }
                PatternStatus::Checked { objects } => {
                    result.objects_checked += objects.len();
                    result
                        .matched
                        .extend(objects.iter().filter(|object| object.exists).cloned());
                }
            }
            result.outcomes.push(PatternOutcome {
                pattern: pattern.to_string(),
                status,
            });
        }

        Ok(result)
    }

    fn scan_pattern(
        &self,
        pattern: &str,
        age: Option<Duration>,
        values: &mut HashMap<String, String>,
    ) -> Result<PatternStatus> {
        if pattern.contains('$') {
            let variable = extract_variable(pattern).unwrap_or_default();
            let value = if variable.is_empty() {
                String::new()
            } else {
                self.resolve_cached(variable, values)?
            };
            if value.is_empty() {
                return Ok(PatternStatus::Untested {
                    variable: variable.to_string(),
                });
            }
        }

        if !has_wildcard(pattern) {
            return Ok(PatternStatus::Checked {
                objects: vec![self.check_object(Path::new(pattern), age)],
            });
        }

        let expanded = expand_variables(pattern, |name| self.resolve_cached(name, values))?;
        let query = FindQuery::from_pattern(pattern, &expanded, self.max_matches);
        let candidates = self.platform.find_objects(&query)?;
        if candidates.is_empty() {
            return Ok(PatternStatus::NoMatches);
        }

        let objects = candidates
            .iter()
            .map(|path| self.check_object(path, age))
            .collect();
        Ok(PatternStatus::Checked { objects })
    }

    fn check_object(&self, path: &Path, age: Option<Duration>) -> MatchedObject {
        let stat = self.platform.stat_object(path, age);
        MatchedObject {
            path: path.to_path_buf(),
            exists: stat.is_present(),
            older_than_threshold: stat.older_than_threshold,
        }
    }

    fn resolve_cached(&self, name: &str, values: &mut HashMap<String, String>) -> Result<String> {
        if let Some(value) = values.get(name) {
            return Ok(value.clone());
        }
        let value = self.platform.resolve_variable(name)?.trim().to_string();
        values.insert(name.to_string(), value.clone());
        Ok(value)
    }
}
