//! Clean-state audit against a real filesystem through the Linux platform.

#![cfg(target_os = "linux")]

mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use filetime::{FileTime, set_file_mtime};
use warehouse_maintenance::platform::pal::LinuxPlatform;
use warehouse_maintenance::scanner::audit::{AuditScanner, PatternStatus};

fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, b"x").unwrap();
}

fn age(path: &Path, by: Duration) {
    let when = SystemTime::now() - by;
    set_file_mtime(path, FileTime::from_system_time(when)).unwrap();
}

fn write_list(dir: &Path, lines: &[String]) -> PathBuf {
    let list = dir.join("cust-data.conf");
    fs::write(&list, format!("# customer data\n{}\n", lines.join("\n"))).unwrap();
    list
}

#[test]
fn fresh_device_is_clean() {
    let tmp = common::scratch_dir();
    let root = tmp.path();
    fs::create_dir_all(root.join("netflix")).unwrap();
    let list = write_list(
        root,
        &[
            format!("{}/netflix/*", root.display()),
            format!("{}/hn_service_settings.conf", root.display()),
        ],
    );

    let platform = LinuxPlatform::new(root.join("device.properties"));
    let result = AuditScanner::new(&platform).scan_file(&list, None).unwrap();

    assert!(result.clean());
    assert_eq!(result.total_patterns, 2);
    assert_eq!(result.outcomes[0].status, PatternStatus::NoMatches);
}

#[test]
fn leftovers_are_reported_in_pattern_order() {
    let tmp = common::scratch_dir();
    let root = tmp.path();
    touch(&root.join("proxies.conf"));
    touch(&root.join("netflix/cache/nrd.db"));
    let list = write_list(
        root,
        &[
            format!("{}/proxies.conf", root.display()),
            format!("{}/netflix/*", root.display()),
        ],
    );

    let platform = LinuxPlatform::new(root.join("device.properties"));
    let result = AuditScanner::new(&platform).scan_file(&list, None).unwrap();

    assert!(!result.clean());
    let files = result.files();
    assert_eq!(files[0], root.join("proxies.conf").to_string_lossy());
    // The trailing `/*` searches recursively.
    assert!(files.contains(&root.join("netflix/cache/nrd.db").to_string_lossy().into_owned()));
}

#[test]
fn age_threshold_ignores_recent_objects() {
    let tmp = common::scratch_dir();
    let root = tmp.path();
    let old = root.join("apps/old.conf");
    let new = root.join("apps/new.conf");
    touch(&old);
    touch(&new);
    age(&old, Duration::from_secs(7_200));
    let list = write_list(root, &[format!("{}/apps/*.conf", root.display())]);

    let platform = LinuxPlatform::new(root.join("device.properties"));
    let result = AuditScanner::new(&platform)
        .scan_file(&list, Some(Duration::from_secs(3_600)))
        .unwrap();

    assert_eq!(result.files(), vec![old.to_string_lossy().into_owned()]);
    assert_eq!(result.objects_checked, 2);
}

#[test]
fn variables_come_from_device_properties() {
    let tmp = common::scratch_dir();
    let root = tmp.path();
    touch(&root.join("data/app/state.bin"));
    fs::write(
        root.join("device.properties"),
        format!("APP_DATA={}/data/app\n", root.display()),
    )
    .unwrap();
    let list = write_list(
        root,
        &["$APP_DATA/*".to_string(), "${UNDEFINED_DIR}/*".to_string()],
    );

    let platform = LinuxPlatform::new(root.join("device.properties"));
    let result = AuditScanner::new(&platform).scan_file(&list, None).unwrap();

    assert_eq!(
        result.files(),
        vec![root.join("data/app/state.bin").to_string_lossy().into_owned()]
    );
    assert_eq!(
        result.outcomes[1].status,
        PatternStatus::Untested {
            variable: "UNDEFINED_DIR".to_string()
        }
    );
}

#[test]
fn hidden_entries_are_not_reported() {
    let tmp = common::scratch_dir();
    let root = tmp.path();
    touch(&root.join("cache/.keep"));
    let list = write_list(root, &[format!("{}/cache/*", root.display())]);

    let platform = LinuxPlatform::new(root.join("device.properties"));
    let result = AuditScanner::new(&platform).scan_file(&list, None).unwrap();

    assert!(result.clean());
}

#[test]
fn matches_are_capped_per_pattern() {
    let tmp = common::scratch_dir();
    let root = tmp.path();
    for i in 0..6 {
        touch(&root.join(format!("logs/{i}.log")));
    }
    let list = write_list(root, &[format!("{}/logs/*.log", root.display())]);

    let platform = LinuxPlatform::new(root.join("device.properties"));
    let result = AuditScanner::new(&platform)
        .with_max_matches(4)
        .scan_file(&list, None)
        .unwrap();

    assert_eq!(result.matched.len(), 4);
}

#[test]
fn dangling_symlink_counts_as_leftover() {
    let tmp = common::scratch_dir();
    let root = tmp.path();
    fs::create_dir_all(root.join("data")).unwrap();
    let link = root.join("data/proxies.conf");
    std::os::unix::fs::symlink("/nonexistent/whm-target", &link).unwrap();
    let list = write_list(root, &[format!("{}/data/*", root.display())]);

    let platform = LinuxPlatform::new(root.join("device.properties"));
    let result = AuditScanner::new(&platform).scan_file(&list, None).unwrap();

    assert!(!result.clean());
    assert_eq!(result.files(), vec![link.to_string_lossy().into_owned()]);
}
