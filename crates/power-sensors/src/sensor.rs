// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The capability every power sensor adapter implements.

use crate::SensorError;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Which hardware source a sensor reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SensorKind {
    /// Apple `powermetrics` combined CPU + GPU + ANE power.
    ApplePowermetrics,
    /// NVIDIA GPU board power via the driver's management interface.
    Nvidia,
    /// AMD GPU package power via `rocm-smi`.
    Rocm,
    /// CPU package energy counters via the Linux powercap interface.
    Rapl,
}

impl SensorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::ApplePowermetrics => "apple-powermetrics",
            SensorKind::Nvidia => "nvidia",
            SensorKind::Rocm => "rocm",
            SensorKind::Rapl => "rapl",
        }
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A platform-specific source of instantaneous power readings.
///
/// Adapters are owned by exactly one meter and are moved into its
/// sampling thread for the duration of a session, so reads take
/// `&mut self` and stateful adapters (counter differencing) need no
/// interior locking.
pub trait PowerSensor: Send {
    /// Human-readable adapter name, used in logs and output records.
    fn name(&self) -> &str;

    /// The hardware source this adapter reads.
    fn kind(&self) -> SensorKind;

    /// Cheap, side-effect-free probe. "Not installed" is `false`, never an error.
    fn is_available(&self) -> bool;

    /// Returns the current power draw in watts.
    ///
    /// Counter-based adapters return the average power since the
    /// previous call; their first call after [`reset`](Self::reset)
    /// only primes the counter and reports 0 W.
    fn read_power_watts(&mut self) -> Result<f64, SensorError>;

    /// `true` when readings are averages since the previous read
    /// (energy-counter differencing) rather than instantaneous draw.
    fn is_cumulative(&self) -> bool {
        false
    }

    /// Clears any per-session state. Called at every meter start.
    fn reset(&mut self) {}
}

impl PowerSensor for Box<dyn PowerSensor> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn kind(&self) -> SensorKind {
        (**self).kind()
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn read_power_watts(&mut self) -> Result<f64, SensorError> {
        (**self).read_power_watts()
    }

    fn is_cumulative(&self) -> bool {
        (**self).is_cumulative()
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Looks up an executable by name on `PATH`.
pub(crate) fn find_in_path(program: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

/// Runs a command to completion and returns its trimmed stdout.
pub(crate) fn run_command(program: &str, args: &[&str]) -> Result<String, SensorError> {
    let command = format!("{program} {}", args.join(" "));
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| SensorError::CommandFailed {
            command: command.clone(),
            detail: e.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SensorError::CommandFailed {
            command,
            detail: format!("exit status {}: {}", output.status, stderr.trim()),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Parses the first number that follows `label` on any line of `output`,
/// e.g. `"Combined Power (CPU + GPU + ANE): 1234 mW"` with label
/// `"Combined Power (CPU + GPU + ANE):"` yields `1234.0`.
pub(crate) fn parse_labelled_value(output: &str, label: &str) -> Option<f64> {
    let label = label.to_ascii_lowercase();
    output.lines().find_map(|line| {
        let lower = line.to_ascii_lowercase();
        let idx = lower.find(&label)?;
        let rest = line[idx + label.len()..].trim_start();
        let end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        rest[..end].parse::<f64>().ok()
    })
}
