//! Bounded script dispatch and the two script-driven resets.

#![allow(missing_docs)]

use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;

use crate::core::config::ResetConfig;
use crate::core::errors::{Result, WhmError};
use crate::core::paths::INTERNAL_RESET_PASS_PHRASE;
use crate::platform::pal::{Platform, ShellOutput};
use crate::reset::template::{RenderedScript, TemplateResolver};

/// Runs maintenance scripts through the platform shell.
///
/// The dispatcher accepts at most `max_len - 1` bytes of script text, the
/// same bound a fixed-size, NUL-terminated request buffer would impose.
pub struct ScriptRunner<'a> {
    platform: &'a dyn Platform,
    max_len: usize,
}

impl<'a> ScriptRunner<'a> {
    #[must_use]
    pub fn new(platform: &'a dyn Platform, max_len: usize) -> Self {
        Self { platform, max_len }
    }

    #[must_use]
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Run `script`, succeeding only on exit status 0.
    pub fn run(&self, script: &str) -> Result<ShellOutput> {
        if script.len() > self.max_len.saturating_sub(1) {
            return Err(WhmError::ScriptTooLong {
                limit: self.max_len,
            });
        }

        let output = self.platform.run_shell(script)?;
        if !output.success() {
            return Err(WhmError::ScriptFailed {
                status: output.status,
                details: format!("script returned: {}", output.status),
            });
        }
        Ok(output)
    }
}

/// What a light reset executed.
#[derive(Debug, Clone, Serialize)]
pub struct LightResetReport {
    pub rendered: RenderedScript,
    pub status: i32,
}

/// Resolve the light-reset template without running it.
pub fn render_light_reset(platform: &dyn Platform, config: &ResetConfig) -> Result<RenderedScript> {
    let resolver = TemplateResolver::new(platform, &config.sd_card_device)?;
    Ok(resolver.render(&config.light_reset_template))
}

/// Wipe customer data: resolve the light-reset template and run it.
pub fn light_reset(platform: &dyn Platform, config: &ResetConfig) -> Result<LightResetReport> {
    let rendered = render_light_reset(platform, config)?;
    let output = ScriptRunner::new(platform, config.max_script_len).run(&rendered.script)?;
    Ok(LightResetReport {
        rendered,
        status: output.status,
    })
}

/// Wipe DRM and test state, then reboot.
///
/// Requires the test pass phrase and refuses to run on production images.
pub fn internal_reset(
    platform: &dyn Platform,
    config: &ResetConfig,
    version_file: &Path,
    pass_phrase: &str,
) -> Result<()> {
    if pass_phrase != INTERNAL_RESET_PASS_PHRASE {
        return Err(WhmError::InvalidParameter {
            details: "incorrect pass phrase".to_string(),
        });
    }
    if is_production_image(version_file) {
        return Err(WhmError::Refused {
            reason: "version is PROD".to_string(),
        });
    }
    ScriptRunner::new(platform, config.max_script_len).run(&config.internal_reset_script)?;
    Ok(())
}

/// Whether the image descriptor marks a production build.
///
/// The first `imagename:` line decides. Unreadable or absent descriptors
/// count as non-production.
#[must_use]
pub fn is_production_image(version_file: &Path) -> bool {
    if !is_readable(version_file) {
        return false;
    }
    match fs::read(version_file) {
        Ok(raw) => String::from_utf8_lossy(&raw)
            .lines()
            .find(|line| line.contains("imagename:"))
            .is_some_and(|line| line.contains("PROD")),
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                eprintln!(
                    "[WHM-RESET] failed to read {}: {err}",
                    version_file.display()
                );
            }
            false
        }
    }
}

fn is_readable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        nix::unistd::access(path, nix::unistd::AccessFlags::R_OK).is_ok()
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}
