// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Picks exactly one sensor adapter for the host.
//!
//! Adapters are probed in a fixed per-platform priority order and the
//! first available one wins. Later adapters are never constructed or
//! probed once a winner is found, so a host with both a GPU and CPU
//! counters reports GPU energy only.

use crate::{BenchConfig, ConfigError, Meter, MeterError};
use power_sensors::{
    ApplePowermetricsSensor, NvidiaSensor, Platform, PowerSensor, RaplSensor, RocmSensor,
    SensorKind,
};

const MACOS_PRIORITY: &[SensorKind] = &[SensorKind::ApplePowermetrics];
const LINUX_PRIORITY: &[SensorKind] = &[SensorKind::Nvidia, SensorKind::Rocm, SensorKind::Rapl];
const OTHER_PRIORITY: &[SensorKind] = &[];

/// Adapter probe order for a platform.
pub fn priority_for(platform: Platform) -> &'static [SensorKind] {
    match platform {
        Platform::MacOs => MACOS_PRIORITY,
        Platform::Linux => LINUX_PRIORITY,
        Platform::Other => OTHER_PRIORITY,
    }
}

/// Constructs the production adapter for `kind`.
///
/// Construction is cheap; RAPL zone discovery is the only filesystem
/// access and happens here, not in the probe.
pub fn build_sensor(kind: SensorKind, config: &BenchConfig) -> Box<dyn PowerSensor> {
    match kind {
        SensorKind::ApplePowermetrics => Box::new(ApplePowermetricsSensor::with_window_ms(
            config.sampling_interval_ms,
        )),
        SensorKind::Nvidia => Box::new(NvidiaSensor::new()),
        SensorKind::Rocm => Box::new(RocmSensor::new()),
        SensorKind::Rapl => Box::new(RaplSensor::new()),
    }
}

/// Outcome of meter selection.
///
/// `Unavailable` is not an error: it tells the orchestrator to run
/// unmetered and mark its records as estimated.
#[derive(Debug)]
pub enum MeterSelection {
    Metered(Meter),
    Unavailable { platform: Platform },
}

impl MeterSelection {
    pub fn is_metered(&self) -> bool {
        matches!(self, MeterSelection::Metered(_))
    }

    pub fn meter_mut(&mut self) -> Option<&mut Meter> {
        match self {
            MeterSelection::Metered(meter) => Some(meter),
            MeterSelection::Unavailable { .. } => None,
        }
    }

    /// Name of the selected sensor, if any.
    pub fn sensor_name(&self) -> Option<&str> {
        use crate::EnergyMeter;
        match self {
            MeterSelection::Metered(meter) => Some(meter.sensor_name()),
            MeterSelection::Unavailable { .. } => None,
        }
    }

    /// Unwraps the meter, treating `Unavailable` as an error for callers
    /// that require real measurements.
    pub fn into_meter(self) -> Result<Meter, MeterError> {
        match self {
            MeterSelection::Metered(meter) => Ok(meter),
            MeterSelection::Unavailable { platform } => {
                Err(MeterError::SensorUnavailable { platform })
            }
        }
    }
}

/// Returns the first candidate whose probe succeeds.
///
/// Candidates are pulled lazily; nothing after the winner is evaluated.
pub fn select_from<I>(candidates: I) -> Option<Box<dyn PowerSensor>>
where
    I: IntoIterator<Item = Box<dyn PowerSensor>>,
{
    for sensor in candidates {
        let available = sensor.is_available();
        tracing::debug!(sensor = sensor.name(), available, "probed power sensor");
        if available {
            return Some(sensor);
        }
    }
    None
}

/// Selects a meter for `platform` using the production adapters.
pub fn select_meter_for(platform: Platform, config: &BenchConfig) -> MeterSelection {
    let candidates = priority_for(platform)
        .iter()
        .map(|&kind| build_sensor(kind, config));

    match select_from(candidates) {
        Some(sensor) => {
            tracing::info!(sensor = sensor.name(), %platform, "power sensor selected");
            let meter = Meter::new(sensor).with_baseline_samples(config.baseline_samples);
            MeterSelection::Metered(meter)
        }
        None => {
            tracing::warn!(%platform, "no power sensor available; measurements will be estimated");
            MeterSelection::Unavailable { platform }
        }
    }
}

/// Selects a meter for the platform named by `config.platform_hint`.
pub fn select_meter(config: &BenchConfig) -> Result<MeterSelection, ConfigError> {
    let platform = config.resolve_platform()?;
    Ok(select_meter_for(platform, config))
}
