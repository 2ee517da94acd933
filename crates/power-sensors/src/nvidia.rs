// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! NVIDIA GPU board power via `nvidia-smi`.
//!
//! `nvidia-smi` is a thin front-end over the driver's management library,
//! so an available binary implies a loaded driver. Power is reported in
//! watts as an instantaneous (≈ driver-averaged) board draw:
//!
//! ```text
//! $ nvidia-smi --query-gpu=power.draw --format=csv,noheader,nounits
//! 71.34
//! 68.02
//! ```
//!
//! Some boards list fine but report `[N/A]` for `power.draw`; those are
//! treated as unavailable.

use crate::sensor::{find_in_path, run_command, PowerSensor, SensorKind};
use crate::SensorError;

const NVIDIA_SMI: &str = "nvidia-smi";

/// Which GPUs a [`NvidiaSensor`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuSelection {
    /// A single device index.
    Device(u32),
    /// The sum over every visible GPU.
    All,
}

/// Reads NVIDIA GPU power draw.
#[derive(Debug, Clone)]
pub struct NvidiaSensor {
    selection: GpuSelection,
}

impl NvidiaSensor {
    /// Monitors GPU 0.
    pub fn new() -> Self {
        Self::with_selection(GpuSelection::Device(0))
    }

    pub fn with_selection(selection: GpuSelection) -> Self {
        Self { selection }
    }

    fn query_power_draw(&self) -> Result<String, SensorError> {
        let id_arg;
        let mut args = vec!["--query-gpu=power.draw", "--format=csv,noheader,nounits"];
        if let GpuSelection::Device(index) = self.selection {
            id_arg = format!("--id={index}");
            args.push(id_arg.as_str());
        }
        run_command(NVIDIA_SMI, &args)
    }
}

impl Default for NvidiaSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerSensor for NvidiaSensor {
    fn name(&self) -> &str {
        "NVIDIA GPU (nvidia-smi)"
    }

    fn kind(&self) -> SensorKind {
        SensorKind::Nvidia
    }

    fn is_available(&self) -> bool {
        if find_in_path(NVIDIA_SMI).is_none() {
            return false;
        }
        match run_command(NVIDIA_SMI, &["-L"]) {
            Ok(out) => power_readable(&out, || self.query_power_draw()),
            Err(e) => {
                tracing::debug!("nvidia-smi probe failed: {e}");
                false
            }
        }
    }

    fn read_power_watts(&mut self) -> Result<f64, SensorError> {
        parse_power_draw(&self.query_power_draw()?)
    }
}

/// Counts `GPU N: ...` lines from `nvidia-smi -L`.
fn count_gpus(list_output: &str) -> usize {
    list_output
        .lines()
        .filter(|l| l.trim_start().starts_with("GPU "))
        .count()
}

/// A listed GPU is usable only if one power query also parses.
fn power_readable(
    list_output: &str,
    query: impl FnOnce() -> Result<String, SensorError>,
) -> bool {
    if count_gpus(list_output) == 0 {
        return false;
    }
    match query().and_then(|out| parse_power_draw(&out)) {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!("nvidia-smi lists a GPU but power is unreadable: {e}");
            false
        }
    }
}

/// Sums the per-GPU watts lines of a `power.draw` query.
///
/// Any `[N/A]` or otherwise unparseable line fails the whole sample so a
/// partially-read multi-GPU total is never integrated.
pub(crate) fn parse_power_draw(output: &str) -> Result<f64, SensorError> {
    let mut total = 0.0;
    let mut seen = 0usize;
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let watts: f64 = line.parse().map_err(|_| SensorError::ParseError {
            origin: NVIDIA_SMI.to_string(),
            detail: format!("expected power.draw in watts, got '{line}'"),
        })?;
        total += watts;
        seen += 1;
    }
    if seen == 0 {
        return Err(SensorError::ParseError {
            origin: NVIDIA_SMI.to_string(),
            detail: "empty power.draw output".to_string(),
        });
    }
    Ok(total.max(0.0))
}
