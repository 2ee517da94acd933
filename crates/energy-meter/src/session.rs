// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! A measurement session: one metered generate call.
//!
//! The session starts the meter, runs the blocking generate call, and
//! stops the meter on every exit path. A scope guard owns the stop so
//! that a failing or panicking generator still closes energy accounting
//! and joins the sampling thread.

use crate::{
    EnergyMeter, Generate, GenerationOutcome, MeterError, MeterReading, SessionError,
    DEFAULT_SAMPLING_INTERVAL_MS,
};
use std::time::Instant;

/// Result of a successful session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutput {
    pub reading: MeterReading,
    pub outcome: GenerationOutcome,
}

/// Stops the meter exactly once, either through [`finish`](Self::finish)
/// or on drop.
struct StopGuard<'a, M: EnergyMeter> {
    meter: &'a mut M,
    armed: bool,
}

impl<'a, M: EnergyMeter> StopGuard<'a, M> {
    fn new(meter: &'a mut M) -> Self {
        Self { meter, armed: true }
    }

    fn finish(mut self) -> Result<MeterReading, MeterError> {
        self.armed = false;
        self.meter.stop()
    }
}

impl<M: EnergyMeter> Drop for StopGuard<'_, M> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::warn!(sensor = self.meter.sensor_name(), "generate call unwound; stopping meter");
        if let Err(e) = self.meter.stop() {
            tracing::error!("failed to stop meter during unwind: {e}");
        }
    }
}

/// Runs generate calls under a meter with a fixed sampling interval.
#[derive(Debug, Clone)]
pub struct MeasurementSession {
    sampling_interval_ms: u64,
}

impl MeasurementSession {
    pub fn new(sampling_interval_ms: u64) -> Self {
        Self {
            sampling_interval_ms,
        }
    }

    pub fn sampling_interval_ms(&self) -> u64 {
        self.sampling_interval_ms
    }

    /// Runs one generate call, metered when `meter` is `Some`.
    ///
    /// With no meter the call runs unmetered and the reading is the
    /// [`MeterReading::unmetered`] sentinel. If the generator fails, the
    /// meter is still stopped and the error carries the partial reading.
    /// A missing `response_time_s` is filled in from the session's own
    /// timing of the call.
    pub fn run<M, G>(
        &self,
        meter: Option<&mut M>,
        generator: &mut G,
        prompt: &str,
    ) -> Result<SessionOutput, SessionError>
    where
        M: EnergyMeter,
        G: Generate + ?Sized,
    {
        let Some(meter) = meter else {
            return self.run_unmetered(generator, prompt);
        };

        meter.start(self.sampling_interval_ms)?;
        let guard = StopGuard::new(meter);

        let started = Instant::now();
        let result = generator.generate(prompt);
        let elapsed_s = started.elapsed().as_secs_f64();

        let reading = match guard.finish() {
            Ok(reading) => reading,
            Err(e) => {
                if let Err(gen_err) = &result {
                    tracing::error!("generation also failed: {gen_err}");
                }
                return Err(e.into());
            }
        };

        tracing::debug!(
            energy_wh = reading.energy_wh_raw,
            duration_s = reading.duration_s,
            ok = result.is_ok(),
            "session closed"
        );

        match result {
            Ok(outcome) => Ok(SessionOutput {
                reading,
                outcome: fill_response_time(outcome, elapsed_s),
            }),
            Err(source) => Err(SessionError::GenerationFailed { reading, source }),
        }
    }

    /// Runs one generate call with no meter.
    pub fn run_unmetered<G>(
        &self,
        generator: &mut G,
        prompt: &str,
    ) -> Result<SessionOutput, SessionError>
    where
        G: Generate + ?Sized,
    {
        let started = Instant::now();
        let result = generator.generate(prompt);
        let elapsed_s = started.elapsed().as_secs_f64();
        let reading = MeterReading::unmetered(elapsed_s);

        match result {
            Ok(outcome) => Ok(SessionOutput {
                reading,
                outcome: fill_response_time(outcome, elapsed_s),
            }),
            Err(source) => Err(SessionError::GenerationFailed { reading, source }),
        }
    }
}

impl Default for MeasurementSession {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLING_INTERVAL_MS)
    }
}

fn fill_response_time(mut outcome: GenerationOutcome, elapsed_s: f64) -> GenerationOutcome {
    if !(outcome.response_time_s.is_finite() && outcome.response_time_s > 0.0) {
        outcome.response_time_s = elapsed_s.max(1e-6);
    }
    outcome
}
