//! Device details gathered from the platform's details script.

#![allow(missing_docs)]

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::errors::Result;
use crate::platform::pal::Platform;

/// Key/value device details plus the script's verdict.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DeviceInfo {
    #[serde(flatten)]
    pub properties: BTreeMap<String, String>,
    /// Set when the script exited non-zero; properties printed before the
    /// failure are still reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl DeviceInfo {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// Parse `key=value` lines, splitting at the first `=`.
///
/// Lines without `=` are ignored. Later keys overwrite earlier ones, and the
/// legacy aliases (`version`, `software_version`, `cable_card_firmware_version`)
/// are filled in alongside their source keys.
#[must_use]
pub fn parse_device_details(text: &str) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();
    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key {
            "imageVersion" => {
                properties.insert("version".to_string(), value.to_string());
                properties.insert("software_version".to_string(), value.to_string());
            }
            "cableCardVersion" => {
                properties.insert("cable_card_firmware_version".to_string(), value.to_string());
            }
            _ => {}
        }
        properties.insert(key.to_string(), value.to_string());
    }
    properties
}

/// Run the details `script` and parse its output.
///
/// Fails only when the script cannot be started at all.
pub fn collect_device_info(platform: &dyn Platform, script: &str) -> Result<DeviceInfo> {
    let output = platform.run_shell(script)?;
    let failure = (!output.success()).then(|| {
        let stderr = output.stderr.trim();
        if stderr.is_empty() {
            format!("script returned: {}", output.status)
        } else {
            stderr.to_string()
        }
    });
    Ok(DeviceInfo {
        properties: parse_device_details(&output.stdout),
        failure,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::pal::{MockPlatform, ShellOutput};

    const SCRIPT: &str = "sh /lib/rdk/getDeviceDetails.sh read";

    #[test]
    fn parses_pairs_and_adds_aliases() {
        let details = parse_device_details(
            "estb_mac=AA:BB:CC:DD:EE:FF\nimageVersion=PX051_VBN_2024\ncableCardVersion=1.2.3\nmodel_number=PX051AEI\n",
        );
        assert_eq!(details["estb_mac"], "AA:BB:CC:DD:EE:FF");
        assert_eq!(details["imageVersion"], "PX051_VBN_2024");
        assert_eq!(details["version"], "PX051_VBN_2024");
        assert_eq!(details["software_version"], "PX051_VBN_2024");
        assert_eq!(details["cable_card_firmware_version"], "1.2.3");
        assert_eq!(details["model_number"], "PX051AEI");
    }

    #[test]
    fn splits_at_first_equals_and_skips_other_lines() {
        let details = parse_device_details("banner line\nbuild_flags=a=b\n=empty-key\n");
        assert_eq!(details["build_flags"], "a=b");
        assert_eq!(details[""], "empty-key");
        assert_eq!(details.len(), 2);
    }

    #[test]
    fn collect_reports_success() {
        let platform = MockPlatform::new().with_shell(SCRIPT, ShellOutput::ok("model_number=X1\n"));
        let info = collect_device_info(&platform, SCRIPT).unwrap();
        assert_eq!(info.get("model_number"), Some("X1"));
        assert!(info.failure.is_none());
    }

    #[test]
    fn collect_keeps_partial_output_on_failure() {
        let platform = MockPlatform::new().with_shell(
            SCRIPT,
            ShellOutput {
                status: 1,
                stdout: "model_number=X1\n".to_string(),
                stderr: "mocaIp: not found\n".to_string(),
            },
        );
        let info = collect_device_info(&platform, SCRIPT).unwrap();
        assert_eq!(info.get("model_number"), Some("X1"));
        assert_eq!(info.failure.as_deref(), Some("mocaIp: not found"));
    }

    #[test]
    fn collect_failure_without_stderr_names_status() {
        let platform = MockPlatform::new().with_shell(SCRIPT, ShellOutput::failed(5, ""));
        let info = collect_device_info(&platform, SCRIPT).unwrap();
        assert!(info.properties.is_empty());
        assert_eq!(info.failure.as_deref(), Some("script returned: 5"));
    }

    #[test]
    fn serializes_flat() {
        let info = DeviceInfo {
            properties: parse_device_details("imageVersion=V1\n"),
            failure: None,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["version"], "V1");
        assert!(json.get("failure").is_none());
    }
}
