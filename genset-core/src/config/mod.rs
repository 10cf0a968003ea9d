//! Tunable thresholds for the start/stop sequencer.
//!
//! The JSON document exchanged with operators uses the historical key names
//! (`TEMP_START`, `DT`, ...). Imports are merged field by field into the live
//! configuration and validated before anything is replaced, so a rejected
//! document never leaves the sequencer half-configured.

use core::fmt;
use core::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Temperature at or below which an automatic start is requested.
pub const DEFAULT_START_TEMPERATURE: f64 = 18.0;
/// Offset above the start threshold at which an automatic stop is requested.
pub const DEFAULT_HYSTERESIS: f64 = 2.0;
pub const DEFAULT_MIN_RUNTIME_SECONDS: u32 = 60;
pub const DEFAULT_START_DEBOUNCE: u32 = 3;
pub const DEFAULT_STOP_DEBOUNCE: u32 = 5;

/// Tick cadence at normal speed.
pub const NOMINAL_TICK: Duration = Duration::from_secs(1);

/// Sequencer configuration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(rename = "TEMP_START")]
    pub start_temperature: f64,
    #[serde(rename = "DT")]
    pub hysteresis_delta: f64,
    #[serde(rename = "MIN_RUNTIME_S")]
    pub min_runtime_seconds: u32,
    #[serde(rename = "START_DEBOUNCE")]
    pub start_debounce: u32,
    #[serde(rename = "STOP_DEBOUNCE")]
    pub stop_debounce: u32,
    #[serde(rename = "noise")]
    pub noise_enabled: bool,
    #[serde(rename = "fast", default)]
    pub fast_mode: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            start_temperature: DEFAULT_START_TEMPERATURE,
            hysteresis_delta: DEFAULT_HYSTERESIS,
            min_runtime_seconds: DEFAULT_MIN_RUNTIME_SECONDS,
            start_debounce: DEFAULT_START_DEBOUNCE,
            stop_debounce: DEFAULT_STOP_DEBOUNCE,
            noise_enabled: false,
            fast_mode: false,
        }
    }
}

/// Errors raised while importing, editing, or exporting a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed configuration: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("configuration must be a JSON object")]
    NotAnObject,
    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
    #[error("failed to encode configuration: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Single-field edit applied from the operator console.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConfigSetting {
    StartTemperature(f64),
    Hysteresis(f64),
    MinRuntime(u32),
    StartDebounce(u32),
    StopDebounce(u32),
    Noise(bool),
    Fast(bool),
}

impl ConfigSetting {
    /// Console key for the setting.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            ConfigSetting::StartTemperature(_) => "start-temp",
            ConfigSetting::Hysteresis(_) => "hysteresis",
            ConfigSetting::MinRuntime(_) => "min-runtime",
            ConfigSetting::StartDebounce(_) => "start-debounce",
            ConfigSetting::StopDebounce(_) => "stop-debounce",
            ConfigSetting::Noise(_) => "noise",
            ConfigSetting::Fast(_) => "fast",
        }
    }
}

impl fmt::Display for ConfigSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = self.key();
        match *self {
            ConfigSetting::StartTemperature(value) | ConfigSetting::Hysteresis(value) => {
                write!(f, "{key}={value:.1}")
            }
            ConfigSetting::MinRuntime(value)
            | ConfigSetting::StartDebounce(value)
            | ConfigSetting::StopDebounce(value) => write!(f, "{key}={value}"),
            ConfigSetting::Noise(value) | ConfigSetting::Fast(value) => {
                write!(f, "{key}={}", if value { "on" } else { "off" })
            }
        }
    }
}

/// Partial document used for merge-style imports. Unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    #[serde(rename = "TEMP_START")]
    start_temperature: Option<f64>,
    #[serde(rename = "DT")]
    hysteresis_delta: Option<f64>,
    #[serde(rename = "MIN_RUNTIME_S")]
    min_runtime_seconds: Option<u32>,
    #[serde(rename = "START_DEBOUNCE")]
    start_debounce: Option<u32>,
    #[serde(rename = "STOP_DEBOUNCE")]
    stop_debounce: Option<u32>,
    #[serde(rename = "noise")]
    noise_enabled: Option<bool>,
    #[serde(rename = "fast")]
    fast_mode: Option<bool>,
}

impl Configuration {
    /// Builds a configuration from a JSON document layered over the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the document is not a JSON object, carries
    /// values of the wrong type, or produces an invalid configuration.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.merge_json(text)?;
        Ok(config)
    }

    /// Merges the keys present in `text` into this configuration.
    ///
    /// The configuration is left untouched when an error is returned.
    ///
    /// # Errors
    ///
    /// See [`Configuration::from_json`].
    pub fn merge_json(&mut self, text: &str) -> Result<(), ConfigError> {
        let value: serde_json::Value = serde_json::from_str(text).map_err(ConfigError::Malformed)?;
        if !value.is_object() {
            return Err(ConfigError::NotAnObject);
        }
        let patch: ConfigPatch = serde_json::from_value(value).map_err(ConfigError::Malformed)?;

        let merged = self.patched(&patch);
        merged.validate()?;
        *self = merged;
        Ok(())
    }

    fn patched(&self, patch: &ConfigPatch) -> Self {
        Self {
            start_temperature: patch.start_temperature.unwrap_or(self.start_temperature),
            hysteresis_delta: patch.hysteresis_delta.unwrap_or(self.hysteresis_delta),
            min_runtime_seconds: patch
                .min_runtime_seconds
                .unwrap_or(self.min_runtime_seconds),
            start_debounce: patch.start_debounce.unwrap_or(self.start_debounce),
            stop_debounce: patch.stop_debounce.unwrap_or(self.stop_debounce),
            noise_enabled: patch.noise_enabled.unwrap_or(self.noise_enabled),
            fast_mode: patch.fast_mode.unwrap_or(self.fast_mode),
        }
    }

    /// Returns a copy with `setting` applied, validated.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the edited configuration is invalid.
    pub fn with_setting(&self, setting: ConfigSetting) -> Result<Self, ConfigError> {
        let mut next = *self;
        match setting {
            ConfigSetting::StartTemperature(value) => next.start_temperature = value,
            ConfigSetting::Hysteresis(value) => next.hysteresis_delta = value,
            ConfigSetting::MinRuntime(value) => next.min_runtime_seconds = value,
            ConfigSetting::StartDebounce(value) => next.start_debounce = value,
            ConfigSetting::StopDebounce(value) => next.stop_debounce = value,
            ConfigSetting::Noise(value) => next.noise_enabled = value,
            ConfigSetting::Fast(value) => next.fast_mode = value,
        }
        next.validate()?;
        Ok(next)
    }

    /// Checks that thresholds are finite and the stop threshold never sits
    /// below the start threshold.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.start_temperature.is_finite() {
            return Err(ConfigError::Invalid {
                field: "TEMP_START",
                reason: "must be a finite number",
            });
        }
        if !self.hysteresis_delta.is_finite() {
            return Err(ConfigError::Invalid {
                field: "DT",
                reason: "must be a finite number",
            });
        }
        if self.hysteresis_delta < 0.0 {
            return Err(ConfigError::Invalid {
                field: "DT",
                reason: "must not be negative",
            });
        }
        Ok(())
    }

    /// Exports every key as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if encoding fails.
    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Temperature at or above which the running engine may be stopped.
    #[must_use]
    pub fn stop_temperature(&self) -> f64 {
        self.start_temperature + self.hysteresis_delta
    }

    /// Scales a nominal timer duration for the configured simulation speed.
    #[must_use]
    pub fn scale(&self, nominal: Duration) -> Duration {
        if self.fast_mode { nominal / 2 } else { nominal }
    }

    /// Interval between ticks at the configured simulation speed.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        self.scale(NOMINAL_TICK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Configuration::default();
        assert!((config.start_temperature - 18.0).abs() < f64::EPSILON);
        assert!((config.hysteresis_delta - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.min_runtime_seconds, 60);
        assert_eq!(config.start_debounce, 3);
        assert_eq!(config.stop_debounce, 5);
        assert!(!config.noise_enabled);
        assert!(!config.fast_mode);
        assert!((config.stop_temperature() - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn merge_only_touches_present_keys() {
        let mut config = Configuration::default();
        config
            .merge_json(r#"{"TEMP_START": 15.5, "STOP_DEBOUNCE": 2, "vendor": "acme"}"#)
            .expect("merge should succeed");

        assert!((config.start_temperature - 15.5).abs() < f64::EPSILON);
        assert_eq!(config.stop_debounce, 2);
        assert_eq!(config.start_debounce, DEFAULT_START_DEBOUNCE);
        assert_eq!(config.min_runtime_seconds, DEFAULT_MIN_RUNTIME_SECONDS);
    }

    #[test]
    fn malformed_json_leaves_configuration_untouched() {
        let mut config = Configuration::default();
        let error = config
            .merge_json(r#"{"TEMP_START": 12"#)
            .expect_err("truncated document should fail");
        assert!(matches!(error, ConfigError::Malformed(_)));
        assert_eq!(config, Configuration::default());
    }

    #[test]
    fn wrong_value_type_is_rejected() {
        let mut config = Configuration::default();
        let error = config
            .merge_json(r#"{"TEMP_START": 10, "MIN_RUNTIME_S": "soon"}"#)
            .expect_err("string runtime should fail");
        assert!(matches!(error, ConfigError::Malformed(_)));
        assert_eq!(config, Configuration::default());
    }

    #[test]
    fn non_object_document_is_rejected() {
        let mut config = Configuration::default();
        let error = config.merge_json("[1, 2, 3]").expect_err("array should fail");
        assert!(matches!(error, ConfigError::NotAnObject));
    }

    #[test]
    fn negative_hysteresis_is_rejected_without_mutation() {
        let mut config = Configuration::default();
        let error = config
            .merge_json(r#"{"DT": -1.0, "TEMP_START": 5}"#)
            .expect_err("negative hysteresis should fail");
        assert!(matches!(error, ConfigError::Invalid { field: "DT", .. }));
        assert_eq!(config, Configuration::default());
    }

    #[test]
    fn export_uses_persisted_key_names() {
        let json = Configuration::default()
            .to_json_pretty()
            .expect("export should succeed");
        for key in [
            "TEMP_START",
            "DT",
            "MIN_RUNTIME_S",
            "START_DEBOUNCE",
            "STOP_DEBOUNCE",
            "noise",
            "fast",
        ] {
            assert!(json.contains(&format!("\"{key}\"")), "missing {key} in {json}");
        }

        let restored = Configuration::from_json(&json).expect("round trip should parse");
        assert_eq!(restored, Configuration::default());
    }

    #[test]
    fn fast_mode_halves_timers() {
        let config = Configuration {
            fast_mode: true,
            ..Configuration::default()
        };
        assert_eq!(config.scale(Duration::from_secs(8)), Duration::from_secs(4));
        assert_eq!(config.tick_interval(), Duration::from_millis(500));
        assert_eq!(
            Configuration::default().tick_interval(),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn settings_apply_and_validate() {
        let config = Configuration::default();
        let edited = config
            .with_setting(ConfigSetting::MinRuntime(5))
            .expect("runtime edit should succeed");
        assert_eq!(edited.min_runtime_seconds, 5);

        let error = config
            .with_setting(ConfigSetting::Hysteresis(-0.5))
            .expect_err("negative hysteresis should fail");
        assert!(matches!(error, ConfigError::Invalid { .. }));
        assert_eq!(ConfigSetting::Noise(true).to_string(), "noise=on");
    }
}
