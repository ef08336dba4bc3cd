//! Placeholder substitution for reset script templates.
//!
//! A placeholder is whitespace followed by an upper-case variable name and the
//! run of non-whitespace that trails it, e.g. ` XDG_CACHE_HOME/*`. Each one is
//! replaced by the variable's value plus its suffix, keeping the leading
//! whitespace. Unset variables make the whole placeholder vanish, and a value
//! that turns the token into a root wildcard (`/*`) is dropped so the script
//! can never be aimed at `/`.
//!
//! Matches are taken left to right over the untouched template and folded into
//! a fresh output buffer; substituted text is never re-scanned.

#![allow(missing_docs)]

use std::ops::Range;

use regex::Regex;
use serde::Serialize;

use crate::core::errors::{Result, WhmError};
use crate::platform::pal::Platform;

/// Variable that falls back to the mount table when absent from the environment.
pub const SD_CARD_MOUNT_VARIABLE: &str = "SD_CARD_MOUNT_PATH";

const PLACEHOLDER_PATTERN: &str = r"(\s+)([A-Z_][0-9A-Z_]*)(\S*)";

/// One placeholder occurrence inside a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder<'t> {
    /// Byte range of the whole placeholder (whitespace + name + suffix).
    pub span: Range<usize>,
    pub leading: &'t str,
    pub variable: &'t str,
    pub suffix: &'t str,
}

/// How one placeholder was rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Substitution {
    pub variable: String,
    pub value: String,
    pub replacement: String,
}

/// A fully substituted script plus the per-placeholder trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedScript {
    pub script: String,
    pub substitutions: Vec<Substitution>,
}

/// Resolves placeholders in a script template against the environment.
pub struct TemplateResolver<'a> {
    platform: &'a dyn Platform,
    placeholder: Regex,
    sd_card_device: String,
}

impl<'a> TemplateResolver<'a> {
    /// `sd_card_device` names the partition whose mount point backs
    /// [`SD_CARD_MOUNT_VARIABLE`]; it is embedded in a shell pipeline and must
    /// already be validated.
    pub fn new(platform: &'a dyn Platform, sd_card_device: &str) -> Result<Self> {
        let placeholder = Regex::new(PLACEHOLDER_PATTERN).map_err(|err| WhmError::Runtime {
            details: format!("placeholder pattern failed to compile: {err}"),
        })?;
        Ok(Self {
            platform,
            placeholder,
            sd_card_device: sd_card_device.to_string(),
        })
    }

    /// Placeholders of `template`, left to right, non-overlapping.
    pub fn placeholders<'t>(&self, template: &'t str) -> impl Iterator<Item = Placeholder<'t>> {
        self.placeholder.captures_iter(template).filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(Placeholder {
                span: whole.range(),
                leading: caps.get(1)?.as_str(),
                variable: caps.get(2)?.as_str(),
                suffix: caps.get(3).map_or("", |m| m.as_str()),
            })
        })
    }

    /// Substitute every placeholder in `template`.
    pub fn resolve(&self, template: &str) -> String {
        self.render(template).script
    }

    /// Like [`resolve`](Self::resolve), also reporting each substitution.
    pub fn render(&self, template: &str) -> RenderedScript {
        let mut script = String::with_capacity(template.len());
        let mut substitutions = Vec::new();
        let mut cursor = 0;

        for found in self.placeholders(template) {
            let value = self.lookup(found.variable);
            let replacement = substitute(found.leading, &value, found.suffix);

            script.push_str(&template[cursor..found.span.start]);
            script.push_str(&replacement);
            cursor = found.span.end;

            substitutions.push(Substitution {
                variable: found.variable.to_string(),
                value,
                replacement,
            });
        }
        script.push_str(&template[cursor..]);

        RenderedScript {
            script,
            substitutions,
        }
    }

    /// Shell pipeline printing the mount point of the SD card partition.
    #[must_use]
    pub fn mount_lookup_command(&self) -> String {
        format!(
            "cat  /proc/mounts | grep {} | awk '{{print $2}}' ",
            self.sd_card_device
        )
    }

    fn lookup(&self, variable: &str) -> String {
        let value = self.platform.env_var(variable).unwrap_or_default();
        if !value.is_empty() || variable != SD_CARD_MOUNT_VARIABLE {
            return value;
        }

        let command = self.mount_lookup_command();
        match self.platform.run_shell(&command) {
            Ok(output) => output.stdout.trim().to_string(),
            Err(err) => {
                eprintln!("[WHM-TEMPLATE] failed to look up {SD_CARD_MOUNT_VARIABLE}: {err}");
                String::new()
            }
        }
    }
}

/// Replacement text for one placeholder given its resolved `value`.
///
/// Empty values drop the placeholder together with its leading whitespace.
/// Absolute results that are nothing but slashes, or whose first character
/// after the leading slashes is `*`, are dropped as well.
#[must_use]
pub fn substitute(leading: &str, value: &str, suffix: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    let candidate = format!("{value}{suffix}");
    if candidate.starts_with('/') {
        match candidate.trim_start_matches('/').chars().next() {
            None | Some('*') => return String::new(),
            Some(_) => {}
        }
    }
    format!("{leading}{candidate}")
}
