// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for metering, measurement sessions, and configuration.

use crate::MeterReading;
use power_sensors::Platform;

/// Errors from the meter lifecycle.
///
/// `AlreadyRunning` and `NotRunning` indicate a caller bug (misordered
/// `start`/`stop`) and are never recovered from.
#[derive(Debug, thiserror::Error)]
pub enum MeterError {
    /// `start()` was called while a sampling session is active.
    #[error("meter is already running")]
    AlreadyRunning,

    /// `stop()` was called without a matching `start()`.
    #[error("meter is not running")]
    NotRunning,

    /// The sampling interval must be at least 1 ms.
    #[error("invalid sampling interval: {0} ms")]
    InvalidInterval(u64),

    /// No sensor adapter is available on this platform.
    #[error("no power sensor available on platform '{platform}'")]
    SensorUnavailable { platform: Platform },

    /// The sampling thread panicked; its partial totals are lost.
    #[error("sampling thread for '{sensor}' panicked")]
    SamplerPanicked { sensor: String },

    /// A previous sampler panic took the sensor with it.
    #[error("meter has no sensor (lost after a sampler panic)")]
    SensorLost,
}

/// Failure reported by a generate capability.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// The endpoint could not be reached or returned an error status.
    #[error("generation request failed: {0}")]
    Request(String),

    /// The endpoint answered with something that could not be interpreted.
    #[error("invalid generation response: {0}")]
    InvalidResponse(String),

    /// The request did not complete within its deadline.
    #[error("generation timed out after {seconds:.1}s")]
    Timeout { seconds: f64 },
}

/// Errors from a measurement session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The generate capability failed. Metering was closed cleanly and
    /// the partial reading covers the failed attempt.
    #[error("generation failed: {source}")]
    GenerationFailed {
        reading: MeterReading,
        #[source]
        source: GenerateError,
    },

    /// The meter lifecycle was misused or the sampler died.
    #[error("meter error: {0}")]
    Meter(#[from] MeterError),
}

impl SessionError {
    /// Returns the partial reading of a failed generation, if any.
    pub fn partial_reading(&self) -> Option<&MeterReading> {
        match self {
            SessionError::GenerationFailed { reading, .. } => Some(reading),
            SessionError::Meter(_) => None,
        }
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Parse(String),

    #[error("TOML serialise error: {0}")]
    Serialise(String),

    #[error("invalid value for {field}: {detail}")]
    Invalid { field: &'static str, detail: String },
}
