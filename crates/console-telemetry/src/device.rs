// Copyright 2025-Present Console Telemetry contributors
// SPDX-License-Identifier: Apache-2.0

//! Device metadata snapshotting.
//!
//! The embedding application supplies the raw platform facts once, as a
//! [`DeviceSpec`]; every log entry then carries an immutable [`DeviceInfo`]
//! snapshot derived from it. Hardware identifiers are resolved to a
//! human-readable model name through a static table; identifiers the table
//! does not know pass through raw so nothing is ever lost.

use serde::{Deserialize, Serialize};

/// Raw platform facts as reported by the host application.
///
/// These come from the platform layer (hardware identifier strings like
/// `"iPhone14,2"` or `"Pixel 8"`) and are not interpreted here beyond the
/// model-name lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    pub hardware_id: String,
    pub os_version: String,
    pub app_version: String,
    pub build_number: String,
}

/// Snapshot of device identity and versions attached to each entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub model: String,
    pub os_version: String,
    pub app_version: String,
    pub build_number: String,
}

impl DeviceInfo {
    /// Builds a snapshot for `device_id` from the platform facts.
    #[must_use]
    pub fn snapshot(device_id: &str, spec: &DeviceSpec) -> Self {
        DeviceInfo {
            device_id: device_id.to_string(),
            model: resolve_model(&spec.hardware_id).to_string(),
            os_version: spec.os_version.clone(),
            app_version: spec.app_version.clone(),
            build_number: spec.build_number.clone(),
        }
    }
}

/// Hardware identifier to marketing model name.
///
/// Deliberately small: only the devices the console app is routinely run
/// on. Unknown identifiers fall through unchanged.
const DEVICE_MODELS: &[(&str, &str)] = &[
    ("iPhone13,2", "iPhone 12"),
    ("iPhone13,3", "iPhone 12 Pro"),
    ("iPhone14,2", "iPhone 13 Pro"),
    ("iPhone14,5", "iPhone 13"),
    ("iPhone15,2", "iPhone 14 Pro"),
    ("iPhone15,4", "iPhone 15"),
    ("iPhone16,1", "iPhone 15 Pro"),
    ("iPad13,1", "iPad Air (4th gen)"),
    ("iPad14,3", "iPad Pro 11-inch (4th gen)"),
    ("Pixel 7", "Google Pixel 7"),
    ("Pixel 8", "Google Pixel 8"),
    ("SM-S918B", "Samsung Galaxy S23 Ultra"),
];

/// Resolves a platform hardware identifier to a model name, passing
/// unknown identifiers through raw.
#[must_use]
pub fn resolve_model(hardware_id: &str) -> &str {
    DEVICE_MODELS
        .iter()
        .find(|(id, _)| *id == hardware_id)
        .map_or(hardware_id, |(_, model)| model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_hardware_id_resolves_to_model_name() {
        assert_eq!(resolve_model("iPhone14,2"), "iPhone 13 Pro");
        assert_eq!(resolve_model("Pixel 8"), "Google Pixel 8");
    }

    #[test]
    fn unknown_hardware_id_passes_through_raw() {
        assert_eq!(resolve_model("QuantumPhone9000"), "QuantumPhone9000");
    }

    #[test]
    fn snapshot_copies_spec_fields() {
        let spec = DeviceSpec {
            hardware_id: "iPhone15,2".to_string(),
            os_version: "17.1".to_string(),
            app_version: "2.0.1".to_string(),
            build_number: "201".to_string(),
        };
        let info = DeviceInfo::snapshot("device-42", &spec);
        assert_eq!(info.device_id, "device-42");
        assert_eq!(info.model, "iPhone 14 Pro");
        assert_eq!(info.os_version, "17.1");
        assert_eq!(info.app_version, "2.0.1");
        assert_eq!(info.build_number, "201");
    }
}
