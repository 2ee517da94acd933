// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Apple Silicon / Intel Mac power via `powermetrics`.
//!
//! Each read runs one `powermetrics` sample window of `window_ms`
//! milliseconds, so the reported value is already averaged over that
//! window. The tool needs root; when the process is not root it is run
//! through `sudo -n`, which fails fast instead of prompting. Callers that
//! can prompt should run [`ApplePowermetricsSensor::authenticate_sudo`]
//! first so the credentials are cached before availability is checked.
//!
//! ```text
//! CPU Power: 1234 mW
//! GPU Power: 56 mW
//! ANE Power: 0 mW
//! Combined Power (CPU + GPU + ANE): 1290 mW
//! ```

use crate::sensor::{parse_labelled_value, run_command, PowerSensor, SensorKind};
use crate::SensorError;
use std::path::Path;
use std::process::Command;

const POWERMETRICS: &str = "/usr/bin/powermetrics";

/// Default sample window in milliseconds.
const DEFAULT_WINDOW_MS: u64 = 100;

/// Reads whole-SoC power on macOS.
#[derive(Debug, Clone)]
pub struct ApplePowermetricsSensor {
    window_ms: u64,
    use_sudo: bool,
}

impl ApplePowermetricsSensor {
    pub fn new() -> Self {
        Self::with_window_ms(DEFAULT_WINDOW_MS)
    }

    /// Sets the powermetrics sample window. Clamped to at least 10 ms.
    pub fn with_window_ms(window_ms: u64) -> Self {
        Self {
            window_ms: window_ms.max(10),
            use_sudo: !is_root(),
        }
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// `true` when reads go through `sudo`.
    pub fn requires_sudo(&self) -> bool {
        self.use_sudo
    }

    /// Runs an interactive `sudo -v` on the caller's terminal, caching
    /// credentials for the non-interactive reads that follow.
    pub fn authenticate_sudo() -> Result<(), SensorError> {
        let status = Command::new("sudo")
            .arg("-v")
            .status()
            .map_err(|e| SensorError::CommandFailed {
                command: "sudo -v".to_string(),
                detail: e.to_string(),
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(SensorError::CommandFailed {
                command: "sudo -v".to_string(),
                detail: format!("exit status {status}"),
            })
        }
    }
}

impl Default for ApplePowermetricsSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerSensor for ApplePowermetricsSensor {
    fn name(&self) -> &str {
        "Apple powermetrics"
    }

    fn kind(&self) -> SensorKind {
        SensorKind::ApplePowermetrics
    }

    fn is_available(&self) -> bool {
        cfg!(target_os = "macos")
            && Path::new(POWERMETRICS).exists()
            && privileges_ready(self.use_sudo, || run_command("sudo", &["-n", "true"]).is_ok())
    }

    fn read_power_watts(&mut self) -> Result<f64, SensorError> {
        let window = self.window_ms.to_string();
        let args = ["-n", "1", "-i", window.as_str(), "--samplers", "cpu_power"];
        let out = if !self.use_sudo {
            run_command(POWERMETRICS, &args)?
        } else {
            let mut sudo_args = vec!["-n", POWERMETRICS];
            sudo_args.extend_from_slice(&args);
            run_command("sudo", &sudo_args)?
        };
        parse_powermetrics(&out)
    }
}

/// Extracts total power in watts from one powermetrics report.
///
/// Prefers the combined figure; otherwise sums whichever of CPU, GPU and
/// ANE are present; finally falls back to package power (Intel Macs).
pub(crate) fn parse_powermetrics(output: &str) -> Result<f64, SensorError> {
    if let Some(mw) = parse_labelled_value(output, "Combined Power (CPU + GPU + ANE):") {
        return Ok(mw / 1000.0);
    }

    let components: Vec<f64> = ["CPU Power:", "GPU Power:", "ANE Power:"]
        .iter()
        .filter_map(|label| parse_labelled_value(output, label))
        .collect();
    if !components.is_empty() {
        return Ok(components.iter().sum::<f64>() / 1000.0);
    }

    parse_labelled_value(output, "Package Power:")
        .map(|mw| mw / 1000.0)
        .ok_or_else(|| SensorError::ParseError {
            origin: "powermetrics".to_string(),
            detail: "no power figures in powermetrics output".to_string(),
        })
}

/// Root needs nothing more; otherwise `sudo` must already run without a
/// password prompt.
fn privileges_ready(use_sudo: bool, sudo_noninteractive: impl FnOnce() -> bool) -> bool {
    if !use_sudo {
        return true;
    }
    let ok = sudo_noninteractive();
    if !ok {
        tracing::debug!("powermetrics needs root and sudo has no cached credentials");
    }
    ok
}

fn is_root() -> bool {
    run_command("id", &["-u"]).map(|uid| uid == "0").unwrap_or(false)
}
