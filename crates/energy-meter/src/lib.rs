// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # energy-meter
//!
//! Measures the energy a text-generation request draws from the host.
//!
//! The pieces compose into one pipeline:
//! - [`select_meter`] probes the platform's sensor adapters in a fixed
//!   priority order and wraps the first available one in a [`Meter`].
//! - [`MeasurementSession`] starts the meter, runs a blocking
//!   [`Generate`] call, and stops the meter on every exit path.
//! - [`MetricsCalculator`] turns the resulting [`MeterReading`] and
//!   [`GenerationOutcome`] into a [`MetricsRecord`].
//!
//! # Meter Lifecycle
//! ```text
//! Idle ──start()──▶ Sampling ──stop()──▶ Stopped ──start()──▶ Sampling …
//! ```
//! Sampling runs on a dedicated thread that owns the sensor and the
//! running integral; `stop()` joins it and takes both back.
//!
//! # Integration
//! Energy is the trapezoidal integral of successive samples over their
//! monotonic timestamps. The first sample only seeds the integral.

mod accumulator;
mod config;
mod error;
mod generate;
mod meter;
mod metrics;
mod selector;
mod session;

pub use accumulator::{EnergyAccumulator, PowerSample, SealedEnergy, JOULES_PER_WH};
pub use config::{BenchConfig, DEFAULT_CO2_INTENSITY_G_PER_KWH, DEFAULT_SAMPLING_INTERVAL_MS};
pub use error::{ConfigError, GenerateError, MeterError, SessionError};
pub use generate::{Generate, GenerationOutcome};
pub use meter::{net_energy_wh, EnergyMeter, Meter, MeterReading, MeterState};
pub use metrics::{MeasurementKind, MetricsCalculator, MetricsRecord, MetricsSummary};
pub use selector::{
    build_sensor, priority_for, select_from, select_meter, select_meter_for, MeterSelection,
};
pub use session::{MeasurementSession, SessionOutput};
