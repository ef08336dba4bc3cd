//! Audit-list parsing and path-pattern analysis.
//!
//! An audit list is a plain-text file with one path pattern per line. Blank
//! lines, `#` comments, and `[section]` headers are ignored. A pattern may
//! reference one shell variable defined in the device properties file
//! (`$NAME` or `${NAME}`) and may contain glob metacharacters, in which case it
//! is expanded with a `find`-style [`FindQuery`].

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, WhmError};

/// Characters that route a pattern through wildcard expansion. `$` is
/// included: a parametrized path is always resolved by the filesystem query.
pub const WILDCARD_CHARS: [char; 4] = ['$', '*', '?', '+'];

/// A filesystem query derived from one wildcard pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FindQuery {
    /// Directory to search: the pattern up to its last `/`.
    pub dir: PathBuf,
    /// Glob applied to entry names: the pattern after its last `/`.
    pub name: String,
    /// Descend below `dir`; only patterns ending in `/*` search recursively.
    pub recursive: bool,
    /// Maximum number of matches to report.
    pub limit: usize,
}

impl FindQuery {
    /// Build the query for `pattern` after variable expansion produced `expanded`.
    ///
    /// Recursion is decided on the pattern as written; the directory and name
    /// split is taken from the expanded text.
    #[must_use]
    pub fn from_pattern(pattern: &str, expanded: &str, limit: usize) -> Self {
        let recursive = pattern.len() > 1 && pattern.ends_with("/*");
        let (dir, name) = match expanded.rsplit_once('/') {
            Some(("", name)) => ("/", name),
            Some((dir, name)) => (dir, name),
            // Mirrors `${fp%/*}` / `${fp##*/}` on a slash-free value.
            None => (expanded, expanded),
        };
        Self {
            dir: PathBuf::from(dir),
            name: name.to_string(),
            recursive,
            limit,
        }
    }
}

/// Whether `pattern` needs wildcard expansion.
#[must_use]
pub fn has_wildcard(pattern: &str) -> bool {
    pattern.contains(WILDCARD_CHARS)
}

/// Whether `name` is a valid POSIX shell variable name.
#[must_use]
pub fn is_shell_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Extract the variable a pattern depends on.
///
/// Skips everything before the first `$`, then any run of `$`/`{`, and returns
/// the following run of characters up to the next `$`, `{`, `}`, or `/`. Only
/// one variable is extracted per pattern.
#[must_use]
pub fn extract_variable(pattern: &str) -> Option<&str> {
    let start = pattern.find('$')?;
    let rest = pattern[start..].trim_start_matches(['$', '{']);
    let end = rest.find(['$', '{', '}', '/']).unwrap_or(rest.len());
    let name = rest[..end].trim();
    (!name.is_empty()).then_some(name)
}

/// Expand every `$NAME` and `${NAME}` token in `pattern` through `lookup`.
///
/// A `$` that does not introduce a valid name is kept literally.
pub fn expand_variables<F>(pattern: &str, mut lookup: F) -> Result<String>
where
    F: FnMut(&str) -> Result<String>,
{
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;

    while let Some(idx) = rest.find('$') {
        out.push_str(&rest[..idx]);
        let after = &rest[idx + 1..];

        if let Some(braced) = after.strip_prefix('{')
            && let Some(close) = braced.find('}')
            && is_shell_name(&braced[..close])
        {
            out.push_str(&lookup(&braced[..close])?);
            rest = &braced[close + 1..];
            continue;
        }

        let name_len = after
            .char_indices()
            .find(|&(i, c)| {
                !(c.is_ascii_alphanumeric() || c == '_') || (i == 0 && c.is_ascii_digit())
            })
            .map_or(after.len(), |(i, _)| i);
        if name_len == 0 {
            out.push('$');
            rest = after;
        } else {
            out.push_str(&lookup(&after[..name_len])?);
            rest = &after[name_len..];
        }
    }
    out.push_str(rest);
    Ok(out)
}

/// Parse audit-list text into trimmed pattern lines.
#[must_use]
pub fn parse_audit_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(['#', '[']))
        .map(str::to_string)
        .collect()
}

/// Read and parse the audit list at `path`.
///
/// Fails when the file cannot be read or holds no usable pattern lines; a scan
/// must never proceed on a partial or empty list.
pub fn load_audit_list(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read(path).map_err(|_| WhmError::MissingAuditList {
        path: path.to_path_buf(),
    })?;
    let patterns = parse_audit_list(&String::from_utf8_lossy(&raw));
    if patterns.is_empty() {
        return Err(WhmError::EmptyAuditList {
            path: path.to_path_buf(),
        });
    }
    Ok(patterns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parse_skips_comments_sections_and_blanks() {
        let text = "\
[customer data]
# netflix cache
/opt/netflix/*

   /opt/hn_service_settings.conf
\t#indented comment
$XDG_CACHE_HOME/*
";
        assert_eq!(
            parse_audit_list(text),
            vec![
                "/opt/netflix/*",
                "/opt/hn_service_settings.conf",
                "$XDG_CACHE_HOME/*",
            ]
        );
    }

    #[test]
    fn load_reports_missing_file() {
        let err = load_audit_list(Path::new("/nonexistent/whm/cust-data.conf"))
            .expect_err("missing file should fail");
        assert!(matches!(err, WhmError::MissingAuditList { .. }));
        assert_eq!(err.message(), "Can't open file /nonexistent/whm/cust-data.conf");
    }

    #[test]
    fn load_reports_list_without_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cust-data.conf");
        fs::write(&path, "# only comments\n[section]\n\n").unwrap();
        let err = load_audit_list(&path).expect_err("empty list should fail");
        assert!(matches!(err, WhmError::EmptyAuditList { .. }));
        assert!(err.message().contains("doesn't have any lines with paths"));
    }

    #[test]
    fn wildcard_detection_includes_dollar_and_plus() {
        assert!(has_wildcard("/opt/*.ini"));
        assert!(has_wildcard("/opt/file?.log"));
        assert!(has_wildcard("/opt/c++"));
        assert!(has_wildcard("$APP_DIR/settings.conf"));
        assert!(!has_wildcard("/opt/hn_service_settings.conf"));
    }

    #[test]
    fn extract_variable_handles_both_reference_styles() {
        assert_eq!(extract_variable("$XDG_CACHE_HOME/*"), Some("XDG_CACHE_HOME"));
        assert_eq!(extract_variable("${APP_DIR}/data/*"), Some("APP_DIR"));
        assert_eq!(extract_variable("/mnt/$SD_CARD/netflix"), Some("SD_CARD"));
        assert_eq!(extract_variable("/opt/plain"), None);
        assert_eq!(extract_variable("/opt/$/x"), None);
    }

    #[test]
    fn extract_variable_takes_only_the_first_reference() {
        assert_eq!(extract_variable("$A$B/file"), Some("A"));
        assert_eq!(extract_variable("/x/${FIRST}/${SECOND}"), Some("FIRST"));
    }

    #[test]
    fn expand_variables_substitutes_every_token() {
        let values: HashMap<&str, &str> =
            [("HOME_DIR", "/home/root"), ("APP", "player")].into_iter().collect();
        let lookup = |name: &str| Ok(values.get(name).copied().unwrap_or_default().to_string());

        assert_eq!(
            expand_variables("$HOME_DIR/${APP}/*.db", lookup).unwrap(),
            "/home/root/player/*.db"
        );
        assert_eq!(
            expand_variables("/opt/$MISSING/x", lookup).unwrap(),
            "/opt//x"
        );
        assert_eq!(expand_variables("/opt/$/x", lookup).unwrap(), "/opt/$/x");
        assert_eq!(expand_variables("/opt/a$", lookup).unwrap(), "/opt/a$");
    }

    #[test]
    fn query_recurses_only_for_trailing_slash_star() {
        let q = FindQuery::from_pattern("/opt/netflix/*", "/opt/netflix/*", 10);
        assert_eq!(q.dir, PathBuf::from("/opt/netflix"));
        assert_eq!(q.name, "*");
        assert!(q.recursive);

        let q = FindQuery::from_pattern("/opt/QT/*.ini", "/opt/QT/*.ini", 10);
        assert_eq!(q.dir, PathBuf::from("/opt/QT"));
        assert_eq!(q.name, "*.ini");
        assert!(!q.recursive);

        let q = FindQuery::from_pattern("/opt/*/cache", "/opt/*/cache", 10);
        assert!(!q.recursive);
    }

    #[test]
    fn query_splits_expanded_text() {
        let q = FindQuery::from_pattern("$CACHE/*", "/var/cache/app/*", 10);
        assert_eq!(q.dir, PathBuf::from("/var/cache/app"));
        assert_eq!(q.name, "*");
        assert!(q.recursive);
        assert_eq!(q.limit, 10);
    }

    #[test]
    fn query_for_root_level_glob_searches_root() {
        let q = FindQuery::from_pattern("/*.ini", "/*.ini", 10);
        assert_eq!(q.dir, PathBuf::from("/"));
        assert_eq!(q.name, "*.ini");
        assert!(!q.recursive);
    }

    #[test]
    fn shell_names() {
        assert!(is_shell_name("XDG_CACHE_HOME"));
        assert!(is_shell_name("_x1"));
        assert!(!is_shell_name("1abc"));
        assert!(!is_shell_name("A-B"));
        assert!(!is_shell_name(""));
    }
}
