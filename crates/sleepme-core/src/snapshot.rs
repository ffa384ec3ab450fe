// ── Device snapshot ──
//
// Immutable point-in-time view of one device. Built whole from a single
// API response and shared as `Arc<DeviceSnapshot>`, so readers never see
// a half-applied update.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sleepme_api::{DeviceStatus, ThermalControlStatus};

/// Set-point the API reports while the *Max Cool* preset is active.
pub const MAX_COOL_SENTINEL_C: f64 = -1.0;
/// Set-point the API reports while the *Max Heat* preset is active.
pub const MAX_HEAT_SENTINEL_C: f64 = 999.0;
/// Water level below which the reservoir counts as low.
pub const WATER_LOW_THRESHOLD_PERCENT: u64 = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub status: Map<String, Value>,
    pub control: Map<String, Value>,
    pub about: Map<String, Value>,
    pub fetched_at: DateTime<Utc>,
}

impl DeviceSnapshot {
    /// Placeholder published before the first successful fetch.
    pub fn empty() -> Self {
        Self {
            status: Map::new(),
            control: Map::new(),
            about: Map::new(),
            fetched_at: DateTime::UNIX_EPOCH,
        }
    }

    pub fn from_status(status: DeviceStatus, fetched_at: DateTime<Utc>) -> Self {
        Self {
            status: status.status,
            control: status.control,
            about: status.about,
            fetched_at,
        }
    }

    /// `true` until the first successful fetch.
    pub fn is_empty(&self) -> bool {
        self.fetched_at == DateTime::UNIX_EPOCH
    }

    // ── status ───────────────────────────────────────────────────────

    pub fn water_temperature_c(&self) -> Option<f64> {
        self.status.get("water_temperature_c").and_then(Value::as_f64)
    }

    pub fn water_level_percent(&self) -> Option<u64> {
        self.status.get("water_level_percent").and_then(Value::as_u64)
    }

    /// The device's own low-water flag.
    pub fn is_water_low(&self) -> Option<bool> {
        self.status.get("is_water_low").and_then(Value::as_bool)
    }

    /// Low water, either as flagged by the device or by level threshold.
    pub fn water_low(&self) -> bool {
        let flagged = self.is_water_low().unwrap_or(false);
        let below = self
            .water_level_percent()
            .is_some_and(|pct| pct < WATER_LOW_THRESHOLD_PERCENT);
        flagged || below
    }

    /// Whether the device is online. Unknown counts as offline.
    pub fn is_connected(&self) -> bool {
        self.status
            .get("is_connected")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    // ── control ──────────────────────────────────────────────────────

    /// Raw set-point as reported, including preset sentinels.
    pub fn raw_set_temperature_c(&self) -> Option<f64> {
        self.control.get("set_temperature_c").and_then(Value::as_f64)
    }

    /// Set-point in °C, or `None` while a preset sentinel is active.
    pub fn set_temperature_c(&self) -> Option<f64> {
        self.raw_set_temperature_c()
            .filter(|t| !is_preset_sentinel(*t))
    }

    pub fn thermal_control_status(&self) -> Option<ThermalControlStatus> {
        self.control
            .get("thermal_control_status")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
    }

    pub fn is_active(&self) -> bool {
        self.thermal_control_status() == Some(ThermalControlStatus::Active)
    }

    pub fn has_schedule_enabled(&self) -> bool {
        self.control
            .get("has_schedule_enabled")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn brightness_level_percent(&self) -> Option<u64> {
        self.control
            .get("brightness_level_percent")
            .and_then(Value::as_u64)
    }

    pub fn display_temperature_unit(&self) -> Option<&str> {
        self.control
            .get("display_temperature_unit")
            .and_then(Value::as_str)
    }

    // ── about ────────────────────────────────────────────────────────

    pub fn firmware_version(&self) -> Option<&str> {
        self.about.get("firmware_version").and_then(Value::as_str)
    }

    pub fn model(&self) -> Option<&str> {
        self.about.get("model").and_then(Value::as_str)
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.about.get("serial_number").and_then(Value::as_str)
    }

    pub fn mac_address(&self) -> Option<&str> {
        self.about.get("mac_address").and_then(Value::as_str)
    }
}

impl Default for DeviceSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

pub(crate) fn is_preset_sentinel(celsius: f64) -> bool {
    (celsius - MAX_COOL_SENTINEL_C).abs() < f64::EPSILON
        || (celsius - MAX_HEAT_SENTINEL_C).abs() < f64::EPSILON
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn snapshot(body: Value) -> DeviceSnapshot {
        let status: DeviceStatus = serde_json::from_value(body).unwrap();
        DeviceSnapshot::from_status(status, Utc::now())
    }

    #[test]
    fn reads_typed_fields() {
        let snap = snapshot(json!({
            "status": { "water_temperature_c": 23.5, "water_level_percent": 80, "is_connected": true },
            "control": { "set_temperature_c": 21.5, "thermal_control_status": "active", "has_schedule_enabled": true },
            "about": { "model": "DP999NA", "firmware_version": "5.1" }
        }));

        assert_eq!(snap.water_temperature_c(), Some(23.5));
        assert_eq!(snap.set_temperature_c(), Some(21.5));
        assert_eq!(snap.thermal_control_status(), Some(ThermalControlStatus::Active));
        assert!(snap.has_schedule_enabled());
        assert!(snap.is_connected());
        assert!(!snap.water_low());
        assert_eq!(snap.model(), Some("DP999NA"));
        assert!(!snap.is_empty());
    }

    #[test]
    fn preset_sentinels_hide_the_set_point() {
        let snap = snapshot(json!({ "control": { "set_temperature_c": 999 } }));
        assert_eq!(snap.raw_set_temperature_c(), Some(999.0));
        assert_eq!(snap.set_temperature_c(), None);

        let snap = snapshot(json!({ "control": { "set_temperature_c": -1 } }));
        assert_eq!(snap.set_temperature_c(), None);
    }

    #[test]
    fn low_water_from_level_threshold() {
        let snap = snapshot(json!({ "status": { "water_level_percent": 15, "is_water_low": false } }));
        assert!(snap.water_low());
    }

    #[test]
    fn empty_snapshot_is_offline() {
        let snap = DeviceSnapshot::empty();
        assert!(snap.is_empty());
        assert!(!snap.is_connected());
        assert_eq!(snap.thermal_control_status(), None);
    }
}
