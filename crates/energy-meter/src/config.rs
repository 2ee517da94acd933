// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmark configuration loaded from TOML files, the environment, or
//! constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! sampling_interval_ms = 100
//! co2_intensity_g_per_kwh = 350.0
//! platform_hint = "auto"
//! baseline_samples = 0
//! region = "unknown"
//! ```
//!
//! # Environment Overrides
//! `SAMPLING_INTERVAL_MS`, `CO2_INTENSITY_G_KWH`, `PLATFORM_HINT`,
//! `BASELINE_SAMPLES`, and `REGION` take precedence over file values
//! when [`BenchConfig::apply_env`] is called.

use crate::ConfigError;
use power_sensors::Platform;
use std::path::Path;

/// Default sampling interval in milliseconds.
pub const DEFAULT_SAMPLING_INTERVAL_MS: u64 = 100;

/// Default grid carbon intensity (EU average) in g CO2 per kWh.
pub const DEFAULT_CO2_INTENSITY_G_PER_KWH: f64 = 350.0;

/// Configuration for metering and metrics calculation.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Delay between successive power reads.
    pub sampling_interval_ms: u64,
    /// Grid carbon intensity used for the CO2 estimate.
    pub co2_intensity_g_per_kwh: f64,
    /// `"auto"`, `"macos"`, `"linux"`, or `"other"`.
    pub platform_hint: String,
    /// Number of idle samples taken before the workload. `0` disables
    /// baseline correction.
    pub baseline_samples: u32,
    /// Free-form region label copied into every record.
    pub region: String,
}

impl BenchConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string. Missing keys take defaults.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialise(e.to_string()))
    }

    /// Applies overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary lookup (the environment in
    /// production, a map in tests).
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SAMPLING_INTERVAL_MS") {
            self.sampling_interval_ms = parse_field("SAMPLING_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("CO2_INTENSITY_G_KWH") {
            self.co2_intensity_g_per_kwh = parse_field("CO2_INTENSITY_G_KWH", &v)?;
        }
        if let Some(v) = lookup("BASELINE_SAMPLES") {
            self.baseline_samples = parse_field("BASELINE_SAMPLES", &v)?;
        }
        if let Some(v) = lookup("PLATFORM_HINT") {
            self.platform_hint = v;
        }
        if let Some(v) = lookup("REGION") {
            self.region = v;
        }
        Ok(self)
    }

    /// Checks value ranges and the platform hint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "sampling_interval_ms",
                detail: "must be greater than 0".to_string(),
            });
        }
        if !self.co2_intensity_g_per_kwh.is_finite() || self.co2_intensity_g_per_kwh <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "co2_intensity_g_per_kwh",
                detail: format!("must be a positive number, got {}", self.co2_intensity_g_per_kwh),
            });
        }
        self.resolve_platform()?;
        Ok(())
    }

    /// Resolves the platform hint, mapping `"auto"` to the build target.
    pub fn resolve_platform(&self) -> Result<Platform, ConfigError> {
        if self.platform_hint.trim().eq_ignore_ascii_case("auto") {
            return Ok(Platform::current());
        }
        self.platform_hint
            .parse::<Platform>()
            .map_err(|detail| ConfigError::Invalid {
                field: "platform_hint",
                detail,
            })
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            sampling_interval_ms: DEFAULT_SAMPLING_INTERVAL_MS,
            co2_intensity_g_per_kwh: DEFAULT_CO2_INTENSITY_G_PER_KWH,
            platform_hint: "auto".to_string(),
            baseline_samples: 0,
            region: "unknown".to_string(),
        }
    }
}

fn parse_field<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
        field,
        detail: format!("cannot parse '{value}'"),
    })
}
