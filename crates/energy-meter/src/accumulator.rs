// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Running energy integral over irregularly timed power samples.
//!
//! Samples are folded into the total as they arrive and never stored,
//! so memory stays constant however long a benchmark runs.
//!
//! # Integration Rule
//! Trapezoidal over the actual monotonic timestamps of consecutive
//! successful samples:
//!
//! ```text
//! ΔJ = (w[i-1] + w[i]) / 2 · (t[i] − t[i-1])
//! ```
//!
//! The first sample only seeds the integral. Ten samples 100 ms apart at
//! a constant 20 W therefore span nine intervals (0.9 s) and integrate to
//! 18 J = 0.005 Wh.

use std::time::Instant;

/// Joules per watt-hour.
pub const JOULES_PER_WH: f64 = 3600.0;

/// One instantaneous power reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerSample {
    pub at: Instant,
    pub watts: f64,
}

impl PowerSample {
    pub fn new(at: Instant, watts: f64) -> Self {
        Self { at, watts }
    }
}

/// Mutable integral state owned by one sampling session.
///
/// `total_joules` never decreases. Call [`seal`](Self::seal) to freeze it.
#[derive(Debug, Clone, Default)]
pub struct EnergyAccumulator {
    total_joules: f64,
    sample_count: u64,
    failed_samples: u64,
    first_sample_at: Option<Instant>,
    last: Option<PowerSample>,
}

impl EnergyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one sample into the integral and returns the joules it added.
    ///
    /// Negative watts are clamped to zero. A non-finite reading is
    /// counted as a failed sample and ignored. A timestamp earlier than
    /// the previous one contributes nothing but still becomes the new
    /// reference point.
    pub fn record(&mut self, sample: PowerSample) -> f64 {
        if !sample.watts.is_finite() {
            self.record_failure();
            return 0.0;
        }
        let sample = PowerSample {
            watts: sample.watts.max(0.0),
            ..sample
        };

        let added = match self.last {
            None => {
                self.first_sample_at = Some(sample.at);
                0.0
            }
            Some(prev) => {
                let dt = sample.at.saturating_duration_since(prev.at).as_secs_f64();
                (prev.watts + sample.watts) / 2.0 * dt
            }
        };

        self.total_joules += added;
        self.sample_count += 1;
        self.last = Some(sample);
        added
    }

    /// Folds in a reading that is the mean power since `since` (a
    /// counter-derived average). When it is the first sample, the
    /// interval from `since` is integrated as a rectangle instead of
    /// only seeding, so the first counter interval is not lost.
    pub fn record_since(&mut self, since: Instant, sample: PowerSample) -> f64 {
        if self.last.is_some() || !sample.watts.is_finite() {
            return self.record(sample);
        }
        let watts = sample.watts.max(0.0);
        let added = watts * sample.at.saturating_duration_since(since).as_secs_f64();
        self.first_sample_at = Some(since);
        self.total_joules += added;
        self.sample_count += 1;
        self.last = Some(PowerSample { watts, ..sample });
        added
    }

    /// Carries the last reading forward to `at` as a rectangle and returns
    /// the joules it added. Used to close a window without another sensor
    /// read. Does nothing before the first sample and does not count as a
    /// sample.
    pub fn extend_to(&mut self, at: Instant) -> f64 {
        let Some(last) = self.last else {
            return 0.0;
        };
        let added = last.watts * at.saturating_duration_since(last.at).as_secs_f64();
        self.total_joules += added;
        self.last = Some(PowerSample { at, ..last });
        added
    }

    /// Counts a sample that could not be read. Nothing is integrated;
    /// the next successful sample spans the gap.
    pub fn record_failure(&mut self) {
        self.failed_samples += 1;
    }

    pub fn total_joules(&self) -> f64 {
        self.total_joules
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn failed_samples(&self) -> u64 {
        self.failed_samples
    }

    pub fn first_sample_at(&self) -> Option<Instant> {
        self.first_sample_at
    }

    pub fn last_sample_at(&self) -> Option<Instant> {
        self.last.map(|s| s.at)
    }

    /// Freezes the integral into read-only totals.
    pub fn seal(self) -> SealedEnergy {
        let span_s = match (self.first_sample_at, self.last) {
            (Some(first), Some(last)) => last.at.saturating_duration_since(first).as_secs_f64(),
            _ => 0.0,
        };
        SealedEnergy {
            total_joules: self.total_joules,
            sample_count: self.sample_count,
            failed_samples: self.failed_samples,
            span_s,
        }
    }
}

/// Immutable totals of a finished sampling session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SealedEnergy {
    pub total_joules: f64,
    pub sample_count: u64,
    pub failed_samples: u64,
    /// Seconds between the first and last successful sample.
    pub span_s: f64,
}

impl SealedEnergy {
    pub fn energy_wh(&self) -> f64 {
        self.total_joules / JOULES_PER_WH
    }

    /// Mean power over the sampled span, or 0 with fewer than two samples.
    pub fn mean_watts(&self) -> f64 {
        if self.span_s > 0.0 {
            self.total_joules / self.span_s
        } else {
            0.0
        }
    }
}
