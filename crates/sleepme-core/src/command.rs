// ── Mutating commands ──
//
// Each command knows the PATCH it sends, the control field it targets,
// and how to recognise itself in a fresh snapshot.

use serde_json::{Value, json};
use sleepme_api::{
    DevicePatch, MAX_TEMPERATURE_C, MIN_TEMPERATURE_C, ThermalControlStatus,
    normalize_temperature,
};

use crate::error::CoreError;
use crate::snapshot::{DeviceSnapshot, MAX_COOL_SENTINEL_C, MAX_HEAT_SENTINEL_C, is_preset_sentinel};

/// A state change for one device.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Set-point in °C, already normalized to 0.5 °C.
    SetTemperature { celsius: f64 },
    SetThermalControl(ThermalControlStatus),
    SetScheduleEnabled(bool),
    SetBrightness(u8),
}

/// Temperature presets offered by the Dock Pro.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, strum::VariantNames,
)]
#[strum(serialize_all = "kebab-case")]
pub enum Preset {
    /// Leave preset mode and restore the previous set-point.
    None,
    MaxCool,
    MaxHeat,
}

impl Preset {
    /// Sentinel set-point the API uses for this preset.
    pub fn sentinel(self) -> Option<f64> {
        match self {
            Self::None => None,
            Self::MaxCool => Some(MAX_COOL_SENTINEL_C),
            Self::MaxHeat => Some(MAX_HEAT_SENTINEL_C),
        }
    }
}

impl Command {
    /// Build a set-point command, rounding to 0.5 °C and enforcing the
    /// device's range. Preset sentinels pass through untouched.
    pub fn set_temperature(celsius: f64) -> Result<Self, CoreError> {
        if !celsius.is_finite() {
            return Err(CoreError::Validation {
                message: format!("temperature {celsius} is not a number"),
            });
        }
        if is_preset_sentinel(celsius) {
            return Ok(Self::SetTemperature { celsius });
        }
        let celsius = normalize_temperature(celsius);
        if !(MIN_TEMPERATURE_C..=MAX_TEMPERATURE_C).contains(&celsius) {
            return Err(CoreError::Validation {
                message: format!(
                    "temperature {celsius}°C is outside {MIN_TEMPERATURE_C}–{MAX_TEMPERATURE_C}°C"
                ),
            });
        }
        Ok(Self::SetTemperature { celsius })
    }

    pub fn set_power(on: bool) -> Self {
        Self::SetThermalControl(ThermalControlStatus::from(on))
    }

    pub fn set_brightness(percent: u8) -> Result<Self, CoreError> {
        if percent > 100 {
            return Err(CoreError::Validation {
                message: format!("brightness {percent}% is above 100%"),
            });
        }
        Ok(Self::SetBrightness(percent))
    }

    /// Request body for this command.
    pub fn to_patch(&self) -> DevicePatch {
        match self {
            Self::SetTemperature { celsius } => DevicePatch::temperature(*celsius),
            Self::SetThermalControl(status) => DevicePatch::thermal_control(*status),
            Self::SetScheduleEnabled(on) => DevicePatch::schedule_enabled(*on),
            Self::SetBrightness(pct) => DevicePatch::brightness(*pct),
        }
    }

    /// Control field this command writes.
    pub fn field(&self) -> &'static str {
        match self {
            Self::SetTemperature { .. } => "set_temperature_c",
            Self::SetThermalControl(_) => "thermal_control_status",
            Self::SetScheduleEnabled(_) => "has_schedule_enabled",
            Self::SetBrightness(_) => "brightness_level_percent",
        }
    }

    /// Value the target field must hold once the command has landed.
    pub fn expected(&self) -> Value {
        match self {
            Self::SetTemperature { celsius } => json!(celsius),
            Self::SetThermalControl(status) => json!(status.as_ref()),
            Self::SetScheduleEnabled(on) => json!(on),
            Self::SetBrightness(pct) => json!(pct),
        }
    }

    /// Whether `snapshot` shows this command applied.
    pub fn is_satisfied_by(&self, snapshot: &DeviceSnapshot) -> bool {
        match self {
            Self::SetTemperature { celsius } => snapshot
                .raw_set_temperature_c()
                .is_some_and(|t| (t - celsius).abs() < f64::EPSILON),
            Self::SetThermalControl(status) => snapshot.thermal_control_status() == Some(*status),
            Self::SetScheduleEnabled(on) => {
                snapshot.control.get(self.field()).and_then(Value::as_bool) == Some(*on)
            }
            Self::SetBrightness(pct) => {
                snapshot.brightness_level_percent() == Some(u64::from(*pct))
            }
        }
    }

    /// Short human-readable form for logs and errors.
    pub fn description(&self) -> String {
        match self {
            Self::SetTemperature { celsius } if (*celsius - MAX_COOL_SENTINEL_C).abs() < f64::EPSILON => {
                "preset max-cool".into()
            }
            Self::SetTemperature { celsius } if (*celsius - MAX_HEAT_SENTINEL_C).abs() < f64::EPSILON => {
                "preset max-heat".into()
            }
            Self::SetTemperature { celsius } => format!("set temperature {celsius}°C"),
            Self::SetThermalControl(status) => format!("set thermal control {status}"),
            Self::SetScheduleEnabled(true) => "enable schedule".into(),
            Self::SetScheduleEnabled(false) => "disable schedule".into(),
            Self::SetBrightness(pct) => format!("set brightness {pct}%"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use sleepme_api::DeviceStatus;

    use super::*;

    fn snapshot_with(control: Value) -> DeviceSnapshot {
        let status: DeviceStatus = serde_json::from_value(json!({ "control": control })).unwrap();
        DeviceSnapshot::from_status(status, Utc::now())
    }

    #[test]
    fn temperature_is_normalized_before_sending() {
        let cmd = Command::set_temperature(21.3).unwrap();
        assert_eq!(cmd, Command::SetTemperature { celsius: 21.5 });
        assert_eq!(
            serde_json::to_value(cmd.to_patch()).unwrap(),
            json!({ "set_temperature_c": 21.5 })
        );
    }

    #[test]
    fn verification_uses_normalized_value() {
        let cmd = Command::set_temperature(21.3).unwrap();
        assert!(cmd.is_satisfied_by(&snapshot_with(json!({ "set_temperature_c": 21.5 }))));
        assert!(!cmd.is_satisfied_by(&snapshot_with(json!({ "set_temperature_c": 21.3 }))));
    }

    #[test]
    fn out_of_range_is_rejected() {
        assert!(matches!(
            Command::set_temperature(8.0),
            Err(CoreError::Validation { .. })
        ));
        assert!(matches!(
            Command::set_temperature(50.0),
            Err(CoreError::Validation { .. })
        ));
        assert!(Command::set_temperature(12.5).is_ok());
        assert!(Command::set_temperature(46.5).is_ok());
        assert!(Command::set_temperature(f64::NAN).is_err());
    }

    #[test]
    fn preset_sentinels_bypass_range() {
        let cmd = Command::set_temperature(999.0).unwrap();
        assert_eq!(cmd.description(), "preset max-heat");
        assert!(cmd.is_satisfied_by(&snapshot_with(json!({ "set_temperature_c": 999 }))));
        assert_eq!(Preset::MaxCool.sentinel(), Some(-1.0));
        assert_eq!("max-cool".parse::<Preset>().unwrap(), Preset::MaxCool);
    }

    #[test]
    fn power_targets_thermal_control() {
        let cmd = Command::set_power(false);
        assert_eq!(cmd.field(), "thermal_control_status");
        assert_eq!(cmd.expected(), json!("standby"));
        assert!(cmd.is_satisfied_by(&snapshot_with(
            json!({ "thermal_control_status": "standby" })
        )));
        assert!(!cmd.is_satisfied_by(&snapshot_with(
            json!({ "thermal_control_status": "active" })
        )));
    }

    #[test]
    fn schedule_requires_explicit_field() {
        let cmd = Command::SetScheduleEnabled(false);
        assert!(!cmd.is_satisfied_by(&snapshot_with(json!({}))));
        assert!(cmd.is_satisfied_by(&snapshot_with(json!({ "has_schedule_enabled": false }))));
    }

    #[test]
    fn brightness_above_100_is_rejected() {
        assert!(Command::set_brightness(101).is_err());
        assert_eq!(Command::set_brightness(40).unwrap().field(), "brightness_level_percent");
    }
}
