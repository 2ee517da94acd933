// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Efficiency and carbon metrics derived from one metered request.
//!
//! [`MetricsCalculator::calculate`] is pure: the same reading, outcome
//! and configuration always give the same [`MetricsRecord`]. Every
//! division is guarded so outputs are finite and non-negative.

use crate::{BenchConfig, GenerationOutcome, MeterReading, DEFAULT_CO2_INTENSITY_G_PER_KWH};
use power_sensors::DeviceInfo;

/// Whether energy figures come from a real sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementKind {
    Measured,
    /// No sensor was sampled; energy fields are zero.
    Estimated,
}

/// One published benchmark record.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MetricsRecord {
    pub energy_wh_raw: f64,
    pub energy_wh_net: f64,
    pub wh_per_1k_tokens: f64,
    pub energy_kwh_per_token: f64,
    pub g_co2: f64,
    pub tokens_prompt: u64,
    pub tokens_completion: u64,
    pub total_tokens: u64,
    pub tokens_per_second: f64,
    /// Meter wall-clock duration.
    pub duration_s: f64,
    /// Generation time reported by the client.
    pub response_time_s: f64,
    /// `0` marks an unmetered record.
    pub sampling_ms: u64,
    pub baseline_watts: f64,
    pub sample_count: u64,
    pub failed_samples: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor: Option<String>,
    pub measurement: MeasurementKind,
    pub co2_intensity_g_per_kwh: f64,
    pub region: String,
    #[serde(flatten)]
    pub device: Option<DeviceInfo>,
}

impl MetricsRecord {
    pub fn is_measured(&self) -> bool {
        self.measurement == MeasurementKind::Measured
    }

    /// One-line human-readable summary for CLI output.
    pub fn summary(&self) -> String {
        format!(
            "{:.6} Wh net ({:.6} raw), {:.4} Wh/1k tok, {:.4} g CO2, \
             {} tokens ({:.1} tok/s) in {:.2}s [{}]",
            self.energy_wh_net,
            self.energy_wh_raw,
            self.wh_per_1k_tokens,
            self.g_co2,
            self.total_tokens,
            self.tokens_per_second,
            self.response_time_s,
            match self.measurement {
                MeasurementKind::Measured => self.sensor.as_deref().unwrap_or("measured"),
                MeasurementKind::Estimated => "estimated",
            },
        )
    }
}

/// Builds [`MetricsRecord`]s from readings and outcomes.
#[derive(Debug, Clone)]
pub struct MetricsCalculator {
    co2_intensity_g_per_kwh: f64,
    region: String,
    device: Option<DeviceInfo>,
}

impl MetricsCalculator {
    pub fn new(co2_intensity_g_per_kwh: f64) -> Self {
        Self {
            co2_intensity_g_per_kwh,
            region: "unknown".to_string(),
            device: None,
        }
    }

    pub fn from_config(config: &BenchConfig) -> Self {
        Self::new(config.co2_intensity_g_per_kwh).with_region(config.region.clone())
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_device(mut self, device: DeviceInfo) -> Self {
        self.device = Some(device);
        self
    }

    pub fn co2_intensity_g_per_kwh(&self) -> f64 {
        self.co2_intensity_g_per_kwh
    }

    pub fn calculate(&self, reading: &MeterReading, outcome: &GenerationOutcome) -> MetricsRecord {
        let total_tokens = outcome.total_tokens();
        let tokens = total_tokens as f64;
        let energy_wh_raw = non_negative(reading.energy_wh_raw);
        let energy_wh_net = non_negative(reading.energy_wh_net());
        let intensity = non_negative(self.co2_intensity_g_per_kwh);

        let measurement = if reading.is_metered() {
            MeasurementKind::Measured
        } else {
            MeasurementKind::Estimated
        };

        MetricsRecord {
            energy_wh_raw,
            energy_wh_net,
            wh_per_1k_tokens: ratio(energy_wh_net, tokens) * 1000.0,
            energy_kwh_per_token: ratio(energy_wh_net / 1000.0, tokens),
            g_co2: non_negative(energy_wh_net / 1000.0 * intensity),
            tokens_prompt: outcome.tokens_prompt,
            tokens_completion: outcome.tokens_completion,
            total_tokens,
            tokens_per_second: ratio(tokens, outcome.response_time_s),
            duration_s: non_negative(reading.duration_s),
            response_time_s: non_negative(outcome.response_time_s),
            sampling_ms: reading.sampling_ms,
            baseline_watts: non_negative(reading.baseline_watts),
            sample_count: reading.sample_count,
            failed_samples: reading.failed_samples,
            sensor: reading.sensor.clone(),
            measurement,
            co2_intensity_g_per_kwh: intensity,
            region: self.region.clone(),
            device: self.device.clone(),
        }
    }
}

impl Default for MetricsCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_CO2_INTENSITY_G_PER_KWH)
    }
}

/// Totals across a batch of records.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct MetricsSummary {
    pub runs: usize,
    pub measured_runs: usize,
    pub total_energy_wh_net: f64,
    pub total_tokens: u64,
    pub total_g_co2: f64,
    /// Batch energy per 1k tokens (not the mean of per-run ratios).
    pub wh_per_1k_tokens: f64,
    pub mean_tokens_per_second: f64,
}

impl MetricsSummary {
    pub fn from_records(records: &[MetricsRecord]) -> Self {
        let mut s = Self {
            runs: records.len(),
            ..Self::default()
        };
        let mut tps_sum = 0.0;
        for r in records {
            if r.is_measured() {
                s.measured_runs += 1;
            }
            s.total_energy_wh_net += r.energy_wh_net;
            s.total_tokens = s.total_tokens.saturating_add(r.total_tokens);
            s.total_g_co2 += r.g_co2;
            tps_sum += r.tokens_per_second;
        }
        s.wh_per_1k_tokens = ratio(s.total_energy_wh_net, s.total_tokens as f64) * 1000.0;
        s.mean_tokens_per_second = ratio(tps_sum, s.runs as f64);
        s
    }
}

/// `num / den`, or 0 when the result would not be a finite non-negative number.
fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        non_negative(num / den)
    } else {
        0.0
    }
}

fn non_negative(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}
