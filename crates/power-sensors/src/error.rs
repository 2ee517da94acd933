// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for power sensor adapters.

/// Errors that can occur when probing or reading a power sensor.
///
/// Every variant returned from [`PowerSensor::read_power_watts`] is a
/// per-sample read failure: the meter's sampling loop skips that sample
/// and keeps going.
///
/// [`PowerSensor::read_power_watts`]: crate::PowerSensor::read_power_watts
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    /// The sensor backend is not present on this host.
    #[error("power sensor '{sensor}' is not available on this host")]
    NotAvailable { sensor: String },

    /// Failed to read a sysfs or procfs file.
    #[error("failed to read {path}: {source}")]
    ReadError {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse a numeric value from a sensor's output.
    #[error("failed to parse value from {origin}: {detail}")]
    ParseError { origin: String, detail: String },

    /// An external power tool could not be run or exited unsuccessfully.
    #[error("command '{command}' failed: {detail}")]
    CommandFailed { command: String, detail: String },
}
