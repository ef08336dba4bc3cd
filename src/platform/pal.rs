//! PAL trait: the process, environment, and filesystem capabilities the
//! maintenance core calls into, with a shell-backed Linux implementation and a
//! table-driven mock for deterministic tests.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::env;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::config::Config;
use crate::core::errors::{Result, WhmError};
use crate::scanner::patterns::{FindQuery, is_shell_name};

/// Captured result of a shell command line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ShellOutput {
    /// Exit status; `-1` when the process was killed by a signal.
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ShellOutput {
    /// Successful (status 0) output carrying `stdout`.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given status and diagnostic text.
    #[must_use]
    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    #[must_use]
    pub const fn success(&self) -> bool {
        self.status == 0
    }
}

/// Existence and age of a filesystem object.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectStat {
    pub exists: bool,
    /// `Some` only when an age threshold was supplied.
    pub older_than_threshold: Option<bool>,
}

impl ObjectStat {
    pub const MISSING: Self = Self {
        exists: false,
        older_than_threshold: None,
    };

    /// Whether the object counts as present: it exists and, when a threshold
    /// was supplied, was last modified longer ago than that threshold.
    #[must_use]
    pub const fn is_present(&self) -> bool {
        match self.older_than_threshold {
            Some(older) => self.exists && older,
            None => self.exists,
        }
    }
}

/// OS abstraction consumed by the template resolver and the audit scanner.
pub trait Platform: Send + Sync {
    /// Read an environment-style variable.
    fn env_var(&self, name: &str) -> Option<String>;
    /// Run a caller-constructed command line through `sh -c`.
    fn run_shell(&self, command: &str) -> Result<ShellOutput>;
    /// Value of `name` after sourcing the device properties file; empty when unset.
    fn resolve_variable(&self, name: &str) -> Result<String>;
    /// Concrete paths matching a wildcard query, in the order the filesystem
    /// walk produced them, capped at `query.limit`.
    fn find_objects(&self, query: &FindQuery) -> Result<Vec<PathBuf>>;
    /// Existence (and optional age comparison) for a single path.
    fn stat_object(&self, path: &Path, older_than: Option<Duration>) -> ObjectStat;
}

/// Linux implementation backed by `sh`, `find`, and `stat(2)`.
#[derive(Debug, Clone)]
pub struct LinuxPlatform {
    device_properties: PathBuf,
}

impl LinuxPlatform {
    #[must_use]
    pub fn new(device_properties: impl Into<PathBuf>) -> Self {
        Self {
            device_properties: device_properties.into(),
        }
    }

    #[must_use]
    pub fn device_properties(&self) -> &Path {
        &self.device_properties
    }
}

impl Platform for LinuxPlatform {
    fn env_var(&self, name: &str) -> Option<String> {
        env::var(name).ok()
    }

    fn run_shell(&self, command: &str) -> Result<ShellOutput> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| WhmError::exec(command, source))?;
        Ok(ShellOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn resolve_variable(&self, name: &str) -> Result<String> {
        if !is_shell_name(name) {
            return Ok(String::new());
        }
        // Path and name travel as positional parameters, never spliced into the script.
        let output = Command::new("sh")
            .arg("-c")
            .arg(r#"set -a; [ -r "$1" ] && . "$1" >/dev/null 2>&1; printenv "$2""#)
            .arg("sh")
            .arg(&self.device_properties)
            .arg(name)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|source| WhmError::exec(format!("resolve ${name}"), source))?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn find_objects(&self, query: &FindQuery) -> Result<Vec<PathBuf>> {
        let mut command = Command::new("find");
        command.arg(&query.dir).args(["-mindepth", "1"]);
        if !query.recursive {
            command.args(["-maxdepth", "1"]);
        }
        command
            .args(["!", "-path", "*/.*", "-name"])
            .arg(&query.name)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = command
            .spawn()
            .map_err(|source| WhmError::exec(format!("find {}", query.dir.display()), source))?;

        let mut found = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                found.push(PathBuf::from(line));
                if found.len() >= query.limit {
                    break;
                }
            }
        }
        // Stop a still-running recursive walk once the cap is reached.
        let _ = child.kill();
        let _ = child.wait();
        Ok(found)
    }

    fn stat_object(&self, path: &Path, older_than: Option<Duration>) -> ObjectStat {
        // A dangling symlink is still an object left on the device.
        let Ok(link_meta) = fs::symlink_metadata(path) else {
            return ObjectStat {
                exists: false,
                older_than_threshold: older_than.map(|_| false),
            };
        };
        let older_than_threshold = older_than.map(|threshold| {
            fs::metadata(path)
                .unwrap_or(link_meta)
                .modified()
                .ok()
                .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
                .is_some_and(|age| age > threshold)
        });
        ObjectStat {
            exists: true,
            older_than_threshold,
        }
    }
}

/// In-memory mock implementation for deterministic tests.
///
/// Unknown shell commands answer with status 127, unknown variables resolve
/// empty, unknown queries match nothing, unknown paths do not exist.
#[derive(Debug, Default)]
pub struct MockPlatform {
    env: HashMap<String, String>,
    shell: HashMap<String, ShellOutput>,
    properties: HashMap<String, String>,
    finds: HashMap<FindQuery, Vec<PathBuf>>,
    objects: HashMap<PathBuf, Duration>,
    commands: Mutex<Vec<String>>,
    resolved: Mutex<Vec<String>>,
    queries: Mutex<Vec<FindQuery>>,
}

impl MockPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_env(mut self, name: &str, value: &str) -> Self {
        self.env.insert(name.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn with_shell(mut self, command: &str, output: ShellOutput) -> Self {
        self.shell.insert(command.to_string(), output);
        self
    }

    #[must_use]
    pub fn with_property(mut self, name: &str, value: &str) -> Self {
        self.properties.insert(name.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn with_find(mut self, query: FindQuery, paths: &[&str]) -> Self {
        self.finds
            .insert(query, paths.iter().map(PathBuf::from).collect());
        self
    }

    /// Register an existing object last modified `age` ago.
    #[must_use]
    pub fn with_object(mut self, path: &str, age: Duration) -> Self {
        self.objects.insert(PathBuf::from(path), age);
        self
    }

    /// Shell commands issued so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    /// Variables resolved so far, in order.
    pub fn resolved_variables(&self) -> Vec<String> {
        self.resolved.lock().clone()
    }

    /// Find queries issued so far, in order.
    pub fn queries(&self) -> Vec<FindQuery> {
        self.queries.lock().clone()
    }
}

impl Platform for MockPlatform {
    fn env_var(&self, name: &str) -> Option<String> {
        self.env.get(name).cloned()
    }

    fn run_shell(&self, command: &str) -> Result<ShellOutput> {
        self.commands.lock().push(command.to_string());
        Ok(self
            .shell
            .get(command)
            .cloned()
            .unwrap_or_else(|| ShellOutput::failed(127, "mock: command not found")))
    }

    fn resolve_variable(&self, name: &str) -> Result<String> {
        self.resolved.lock().push(name.to_string());
        Ok(self.properties.get(name).cloned().unwrap_or_default())
    }

    fn find_objects(&self, query: &FindQuery) -> Result<Vec<PathBuf>> {
        self.queries.lock().push(query.clone());
        let mut found = self.finds.get(query).cloned().unwrap_or_default();
        found.truncate(query.limit);
        Ok(found)
    }

    fn stat_object(&self, path: &Path, older_than: Option<Duration>) -> ObjectStat {
        match self.objects.get(path) {
            Some(age) => ObjectStat {
                exists: true,
                older_than_threshold: older_than.map(|threshold| *age > threshold),
            },
            None => ObjectStat {
                exists: false,
                older_than_threshold: older_than.map(|_| false),
            },
        }
    }
}

/// Detect the active platform implementation.
pub fn detect_platform(config: &Config) -> Result<Arc<dyn Platform>> {
    #[cfg(target_os = "linux")]
    {
        Ok(Arc::new(LinuxPlatform::new(
            config.paths.device_properties.clone(),
        )))
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = config;
        Err(WhmError::Unsupported {
            capability: "non-Linux platform",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    // `tempfile` defaults to a `.tmp` prefix, which the hidden-entry filter would reject.
    fn scratch() -> tempfile::TempDir {
        tempfile::Builder::new().prefix("whm-").tempdir().unwrap()
    }

    fn query(dir: &Path, name: &str, recursive: bool) -> FindQuery {
        FindQuery {
            dir: dir.to_path_buf(),
            name: name.to_string(),
            recursive,
            limit: 10,
        }
    }

    #[test]
    fn object_presence_honors_threshold() {
        let plain = ObjectStat {
            exists: true,
            older_than_threshold: None,
        };
        assert!(plain.is_present());

        let young = ObjectStat {
            exists: true,
            older_than_threshold: Some(false),
        };
        assert!(!young.is_present());

        assert!(!ObjectStat::MISSING.is_present());
    }

    #[test]
    fn linux_run_shell_captures_status_and_stdout() {
        let platform = LinuxPlatform::new("/nonexistent/device.properties");
        let out = platform.run_shell("echo hello; exit 3").expect("sh should spawn");
        assert_eq!(out.status, 3);
        assert_eq!(out.stdout.trim(), "hello");
        assert!(!out.success());
    }

    #[test]
    fn linux_resolve_variable_sources_properties() {
        let dir = tempfile::tempdir().unwrap();
        let props = dir.path().join("device.properties");
        fs::write(&props, "DEVICE_TYPE=mediaclient\nAPP_DIR=/opt/apps\n").unwrap();

        let platform = LinuxPlatform::new(&props);
        assert_eq!(platform.resolve_variable("APP_DIR").unwrap(), "/opt/apps");
        assert_eq!(
            platform
                .resolve_variable("WHM_SURELY_UNSET_VARIABLE_4711")
                .unwrap(),
            ""
        );
    }

    #[test]
    fn linux_resolve_variable_rejects_non_identifiers() {
        let platform = LinuxPlatform::new("/nonexistent/device.properties");
        assert_eq!(platform.resolve_variable("A; reboot").unwrap(), "");
        assert_eq!(platform.resolve_variable("").unwrap(), "");
    }

    #[test]
    fn linux_find_respects_depth_and_hidden_entries() {
        let dir = scratch();
        let root = dir.path();
        fs::write(root.join("a.ini"), "").unwrap();
        fs::write(root.join(".hidden.ini"), "").unwrap();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("sub").join("b.ini"), "").unwrap();

        let platform = LinuxPlatform::new("/nonexistent/device.properties");

        let shallow = platform.find_objects(&query(root, "*.ini", false)).unwrap();
        assert_eq!(shallow, vec![root.join("a.ini")]);

        let mut deep = platform.find_objects(&query(root, "*", true)).unwrap();
        deep.sort();
        assert_eq!(
            deep,
            vec![root.join("a.ini"), root.join("sub"), root.join("sub").join("b.ini")]
        );
    }

    #[test]
    fn linux_find_caps_results() {
        let dir = scratch();
        for i in 0..25 {
            fs::write(dir.path().join(format!("f{i}.log")), "").unwrap();
        }
        let platform = LinuxPlatform::new("/nonexistent/device.properties");
        let mut q = query(dir.path(), "*.log", false);
        q.limit = 10;
        assert_eq!(platform.find_objects(&q).unwrap().len(), 10);
    }

    #[test]
    fn linux_find_on_missing_dir_yields_nothing() {
        let platform = LinuxPlatform::new("/nonexistent/device.properties");
        let found = platform
            .find_objects(&query(Path::new("/nonexistent/whm"), "*", true))
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn linux_stat_compares_age() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.conf");
        fs::write(&path, "x").unwrap();
        let hour_ago = filetime::FileTime::from_system_time(
            SystemTime::now() - Duration::from_secs(3_600),
        );
        filetime::set_file_mtime(&path, hour_ago).unwrap();

        let platform = LinuxPlatform::new("/nonexistent/device.properties");
        let stat = platform.stat_object(&path, Some(Duration::from_secs(60)));
        assert!(stat.exists);
        assert_eq!(stat.older_than_threshold, Some(true));

        let stat = platform.stat_object(&path, Some(Duration::from_secs(7_200)));
        assert_eq!(stat.older_than_threshold, Some(false));

        let missing = platform.stat_object(&dir.path().join("nope"), None);
        assert_eq!(missing, ObjectStat::MISSING);
    }

    #[cfg(unix)]
    #[test]
    fn linux_stat_counts_dangling_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("proxies.conf");
        std::os::unix::fs::symlink("/nonexistent/whm-target", &link).unwrap();

        let platform = LinuxPlatform::new("/nonexistent/device.properties");
        let stat = platform.stat_object(&link, None);
        assert!(stat.exists);
        assert!(stat.is_present());
        assert_eq!(
            platform
                .stat_object(&link, Some(Duration::from_secs(7_200)))
                .older_than_threshold,
            Some(false)
        );
    }

    #[test]
    fn mock_records_commands_and_defaults_to_failure() {
        let platform = MockPlatform::new().with_shell("true", ShellOutput::ok(""));
        assert!(platform.run_shell("true").unwrap().success());
        assert_eq!(platform.run_shell("bogus").unwrap().status, 127);
        assert_eq!(platform.commands(), vec!["true", "bogus"]);
    }
}
