// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! AMD GPU package power via `rocm-smi`.

use crate::sensor::{find_in_path, parse_labelled_value, run_command, PowerSensor, SensorKind};
use crate::SensorError;

const ROCM_SMI: &str = "rocm-smi";

/// Labels tried in order against `rocm-smi -p` output. Newer releases
/// print "Current Socket Graphics Package Power", older ones "Average".
const POWER_LABELS: &[&str] = &[
    "Average Graphics Package Power (W):",
    "Current Socket Graphics Package Power (W):",
    "Average Graphics Package Power:",
    "Current Socket Graphics Package Power:",
    "GPU Power:",
    "Power:",
];

/// Reads AMD GPU power draw for one device.
#[derive(Debug, Clone)]
pub struct RocmSensor {
    device_index: u32,
}

impl RocmSensor {
    pub fn new() -> Self {
        Self::with_device(0)
    }

    pub fn with_device(device_index: u32) -> Self {
        Self { device_index }
    }
}

impl Default for RocmSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerSensor for RocmSensor {
    fn name(&self) -> &str {
        "AMD GPU (rocm-smi)"
    }

    fn kind(&self) -> SensorKind {
        SensorKind::Rocm
    }

    fn is_available(&self) -> bool {
        if find_in_path(ROCM_SMI).is_none() {
            return false;
        }
        match query_power(self.device_index) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("rocm-smi present but power is unreadable: {e}");
                false
            }
        }
    }

    fn read_power_watts(&mut self) -> Result<f64, SensorError> {
        query_power(self.device_index)
    }
}

fn query_power(device_index: u32) -> Result<f64, SensorError> {
    let device = device_index.to_string();
    let out = run_command(ROCM_SMI, &["-d", &device, "-p"])?;
    parse_rocm_power(&out)
}

pub(crate) fn parse_rocm_power(output: &str) -> Result<f64, SensorError> {
    POWER_LABELS
        .iter()
        .find_map(|label| parse_labelled_value(output, label))
        .ok_or_else(|| SensorError::ParseError {
            origin: ROCM_SMI.to_string(),
            detail: "no power reading in rocm-smi output".to_string(),
        })
}
