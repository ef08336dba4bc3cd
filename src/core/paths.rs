//! Well-known on-device locations and the stock maintenance scripts.

/// Default service configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/whm/config.toml";

/// Path-pattern list audited by the clean check.
pub const AUDIT_LIST_FILE: &str = "/lib/rdk/cust-data.conf";

/// Device properties, sourced by `sh` to resolve pattern variables.
pub const DEVICE_PROPERTIES_FILE: &str = "/etc/device.properties";

/// Image version descriptor; an `imagename:` line containing `PROD` blocks internal resets.
pub const VERSION_FILE: &str = "/version.txt";

/// Append-only activity log.
pub const ACTIVITY_LOG_FILE: &str = "/opt/logs/whm-activity.jsonl";

/// RAM-backed fallback for the activity log.
pub const ACTIVITY_LOG_FALLBACK: &str = "/tmp/whm-activity.jsonl";

/// Emits `key=value` lines describing the box.
pub const DEVICE_INFO_SCRIPT: &str = "sh /lib/rdk/getDeviceDetails.sh read";

/// Light (customer data) reset. Upper-case tokens are placeholders resolved
/// from the environment at dispatch time.
pub const LIGHT_RESET_TEMPLATE: &str = "rm -rf /opt/netflix/* SD_CARD_MOUNT_PATH/netflix/* XDG_DATA_HOME/* XDG_CACHE_HOME/* XDG_CACHE_HOME/../.sparkStorage/ /opt/QT/home/data/* /opt/hn_service_settings.conf /opt/apps/common/proxies.conf /opt/lib/bluetooth";

/// Internal (test-only) reset. Wipes DRM and whitebox state, then reboots.
pub const INTERNAL_RESET_SCRIPT: &str =
    "rm -rf /opt/drm /opt/www/whitebox /opt/www/authService && /rebootNow.sh -s WarehouseService &";

/// Pass phrase guarding the internal reset.
pub const INTERNAL_RESET_PASS_PHRASE: &str = "FOR TEST PURPOSES ONLY";
