// Wire types for the Sleep.me developer API.
//
// Device status objects are kept as loose JSON maps: the API adds fields
// between firmware releases and the core only reads a handful of them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lowest set-point the device accepts, in °C.
pub const MIN_TEMPERATURE_C: f64 = 12.5;
/// Highest set-point the device accepts, in °C.
pub const MAX_TEMPERATURE_C: f64 = 46.5;

/// Round a Celsius set-point to the nearest 0.5 °C, the device's resolution.
///
/// Halves round away from zero: `21.25 → 21.5`, `21.3 → 21.5`, `21.2 → 21.0`.
pub fn normalize_temperature(celsius: f64) -> f64 {
    (celsius * 2.0).round() / 2.0
}

/// Whether the device is actively heating/cooling.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ThermalControlStatus {
    Active,
    Standby,
}

impl From<bool> for ThermalControlStatus {
    fn from(active: bool) -> Self {
        if active { Self::Active } else { Self::Standby }
    }
}

/// An entry from `GET /devices`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimedDevice {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub attachments: Vec<String>,
    /// Fields this client does not model (firmware, MAC, model, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of `GET /devices/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    #[serde(default)]
    pub status: Map<String, Value>,
    #[serde(default)]
    pub control: Map<String, Value>,
    #[serde(default)]
    pub about: Map<String, Value>,
}

impl DeviceStatus {
    /// `true` when the API answered with no sections at all.
    pub fn is_empty(&self) -> bool {
        self.status.is_empty() && self.control.is_empty() && self.about.is_empty()
    }
}

/// Partial update body for `PATCH /devices/{id}`.
///
/// Only populated fields are serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DevicePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_temperature_c: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thermal_control_status: Option<ThermalControlStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_schedule_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness_level_percent: Option<u8>,
}

impl DevicePatch {
    /// Set-point update. The value is normalized to 0.5 °C before it is stored.
    pub fn temperature(celsius: f64) -> Self {
        Self {
            set_temperature_c: Some(normalize_temperature(celsius)),
            ..Self::default()
        }
    }

    pub fn thermal_control(status: ThermalControlStatus) -> Self {
        Self {
            thermal_control_status: Some(status),
            ..Self::default()
        }
    }

    pub fn schedule_enabled(enabled: bool) -> Self {
        Self {
            has_schedule_enabled: Some(enabled),
            ..Self::default()
        }
    }

    pub fn brightness(percent: u8) -> Self {
        Self {
            brightness_level_percent: Some(percent.min(100)),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn temperature_rounds_to_half_degree() {
        assert!((normalize_temperature(21.3) - 21.5).abs() < f64::EPSILON);
        assert!((normalize_temperature(21.2) - 21.0).abs() < f64::EPSILON);
        assert!((normalize_temperature(21.75) - 22.0).abs() < f64::EPSILON);
        assert!((normalize_temperature(-1.0) + 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn patch_serializes_only_set_fields() {
        let body = serde_json::to_value(DevicePatch::temperature(21.3)).unwrap();
        assert_eq!(body, json!({ "set_temperature_c": 21.5 }));

        let body = serde_json::to_value(DevicePatch::thermal_control(
            ThermalControlStatus::Standby,
        ))
        .unwrap();
        assert_eq!(body, json!({ "thermal_control_status": "standby" }));

        let body = serde_json::to_value(DevicePatch::brightness(140)).unwrap();
        assert_eq!(body, json!({ "brightness_level_percent": 100 }));
    }

    #[test]
    fn status_sections_default_to_empty() {
        let status: DeviceStatus = serde_json::from_value(json!({
            "control": { "thermal_control_status": "active" }
        }))
        .unwrap();
        assert!(status.status.is_empty());
        assert_eq!(status.control["thermal_control_status"], json!("active"));
        assert!(!status.is_empty());
    }

    #[test]
    fn thermal_status_parses_from_str() {
        assert_eq!(
            "active".parse::<ThermalControlStatus>().unwrap(),
            ThermalControlStatus::Active
        );
        assert_eq!(ThermalControlStatus::from(false).to_string(), "standby");
    }
}
