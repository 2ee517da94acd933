// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The meter: one sensor behind a `start` / `stop` lifecycle.
//!
//! ```text
//!  Idle ──start()──▶ Sampling ──stop()──▶ Stopped
//!                       ▲                    │
//!                       └──────start()───────┘
//! ```
//!
//! `start()` moves the sensor into a dedicated sampling thread together
//! with a fresh [`EnergyAccumulator`] and returns immediately. The thread
//! samples, then waits on a stop channel for one interval; the channel
//! doubles as the tick and the cancellation signal. `stop()` signals,
//! joins, and gets the sensor and accumulator back by value, so there is
//! a single owner of the integral at all times and no lock is needed.

use crate::accumulator::{EnergyAccumulator, PowerSample, JOULES_PER_WH};
use crate::MeterError;
use power_sensors::{PowerSensor, SensorKind};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Floor for `duration_s` so the reading is always strictly positive.
const MIN_DURATION_S: f64 = 1e-6;

/// Lifecycle state of a [`Meter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterState {
    Idle,
    Sampling,
    Stopped,
}

/// The sealed result of one metering session.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MeterReading {
    /// Integrated energy in watt-hours, before baseline correction.
    pub energy_wh_raw: f64,
    /// Wall-clock seconds from sampler launch to `stop()`.
    pub duration_s: f64,
    /// Sampling interval used; `0` means no meter was attached.
    pub sampling_ms: u64,
    /// Mean idle power measured before the workload (0 when disabled).
    pub baseline_watts: f64,
    /// Successful samples integrated.
    pub sample_count: u64,
    /// Samples skipped because the sensor could not be read.
    pub failed_samples: u64,
    /// Adapter that produced the reading, `None` when unmetered.
    pub sensor: Option<String>,
}

impl MeterReading {
    /// Sentinel reading for a request that ran without any meter.
    pub fn unmetered(duration_s: f64) -> Self {
        Self {
            energy_wh_raw: 0.0,
            duration_s: positive_duration(duration_s),
            sampling_ms: 0,
            baseline_watts: 0.0,
            sample_count: 0,
            failed_samples: 0,
            sensor: None,
        }
    }

    /// `true` only when a meter ran and at least one sample was read.
    ///
    /// A session whose every read failed integrates nothing; its zero
    /// energy is not a measurement.
    pub fn is_metered(&self) -> bool {
        self.sampling_ms > 0 && self.sample_count > 0
    }

    /// Energy attributable to the workload, clamped at zero.
    pub fn energy_wh_net(&self) -> f64 {
        net_energy_wh(self.energy_wh_raw, self.baseline_watts, self.duration_s)
    }
}

/// `max(0, raw − baseline · duration / 3600)`.
pub fn net_energy_wh(energy_wh_raw: f64, baseline_watts: f64, duration_s: f64) -> f64 {
    let net = energy_wh_raw - baseline_watts * duration_s / JOULES_PER_WH;
    if net.is_finite() {
        net.max(0.0)
    } else {
        0.0
    }
}

fn positive_duration(duration_s: f64) -> f64 {
    if duration_s.is_finite() {
        duration_s.max(MIN_DURATION_S)
    } else {
        MIN_DURATION_S
    }
}

/// The lifecycle a measurement session drives.
///
/// [`Meter`] is the production implementation; the trait exists so
/// sessions can be exercised against test doubles.
pub trait EnergyMeter {
    /// Name of the underlying sensor.
    fn sensor_name(&self) -> &str;

    fn state(&self) -> MeterState;

    /// Begins sampling. Fails with [`MeterError::AlreadyRunning`] while sampling.
    fn start(&mut self, sampling_interval_ms: u64) -> Result<(), MeterError>;

    /// Ends sampling and seals the reading. Fails with
    /// [`MeterError::NotRunning`] unless sampling.
    fn stop(&mut self) -> Result<MeterReading, MeterError>;
}

/// What the sampling thread hands back on join.
struct SamplerOutput {
    sensor: Box<dyn PowerSensor>,
    energy: EnergyAccumulator,
}

/// Handle to a running sampling thread.
struct SamplingWorker {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<SamplerOutput>,
    started_at: Instant,
    sampling_ms: u64,
    baseline_watts: f64,
}

impl SamplingWorker {
    fn shutdown(self) -> (std::thread::Result<SamplerOutput>, Instant, u64, f64, Instant) {
        // A send error only means the thread already exited.
        let _ = self.stop_tx.send(());
        let joined = self.handle.join();
        let stopped_at = Instant::now();
        (joined, self.started_at, self.sampling_ms, self.baseline_watts, stopped_at)
    }
}

/// A power meter wrapping exactly one sensor adapter.
///
/// A meter may be reused across requests but must not be shared by two
/// concurrent sessions; `&mut self` on the lifecycle methods enforces that.
pub struct Meter {
    name: String,
    kind: SensorKind,
    sensor: Option<Box<dyn PowerSensor>>,
    baseline_samples: u32,
    state: MeterState,
    worker: Option<SamplingWorker>,
}

impl Meter {
    /// Wraps a sensor. Baseline sampling is disabled.
    pub fn new(sensor: Box<dyn PowerSensor>) -> Self {
        Self {
            name: sensor.name().to_string(),
            kind: sensor.kind(),
            sensor: Some(sensor),
            baseline_samples: 0,
            state: MeterState::Idle,
            worker: None,
        }
    }

    /// Takes `samples` idle readings at the sampling interval before each
    /// session and records their mean as `baseline_watts`.
    pub fn with_baseline_samples(mut self, samples: u32) -> Self {
        self.baseline_samples = samples;
        self
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn baseline_samples(&self) -> u32 {
        self.baseline_samples
    }
}

impl EnergyMeter for Meter {
    fn sensor_name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> MeterState {
        self.state
    }

    fn start(&mut self, sampling_interval_ms: u64) -> Result<(), MeterError> {
        if self.state == MeterState::Sampling {
            return Err(MeterError::AlreadyRunning);
        }
        if sampling_interval_ms == 0 {
            return Err(MeterError::InvalidInterval(sampling_interval_ms));
        }
        let mut sensor = self.sensor.take().ok_or(MeterError::SensorLost)?;
        let interval = Duration::from_millis(sampling_interval_ms);

        sensor.reset();
        let baseline_watts = measure_baseline(sensor.as_mut(), self.baseline_samples, interval);

        // Counter-based sensors need one priming read; its instant is the
        // origin of the first averaged interval.
        sensor.reset();
        let counter_origin = if sensor.is_cumulative() {
            if let Err(e) = sensor.read_power_watts() {
                tracing::warn!(sensor = %self.name, "priming read failed: {e}");
            }
            Some(Instant::now())
        } else {
            None
        };

        let (stop_tx, stop_rx) = mpsc::channel();
        let started_at = counter_origin.unwrap_or_else(Instant::now);
        let handle = std::thread::Builder::new()
            .name("energy-sampler".to_string())
            .spawn(move || sampling_loop(sensor, interval, counter_origin, stop_rx))
            .map_err(|e| {
                tracing::error!(sensor = %self.name, "cannot spawn sampling thread: {e}");
                MeterError::SamplerPanicked {
                    sensor: self.name.clone(),
                }
            })?;

        self.worker = Some(SamplingWorker {
            stop_tx,
            handle,
            started_at,
            sampling_ms: sampling_interval_ms,
            baseline_watts,
        });
        self.state = MeterState::Sampling;
        tracing::info!(
            sensor = %self.name,
            interval_ms = sampling_interval_ms,
            baseline_watts,
            "metering started"
        );
        Ok(())
    }

    fn stop(&mut self) -> Result<MeterReading, MeterError> {
        if self.state != MeterState::Sampling {
            return Err(MeterError::NotRunning);
        }
        let worker = self.worker.take().ok_or(MeterError::NotRunning)?;
        let (joined, started_at, sampling_ms, baseline_watts, stopped_at) = worker.shutdown();
        self.state = MeterState::Stopped;

        let output = joined.map_err(|_| MeterError::SamplerPanicked {
            sensor: self.name.clone(),
        })?;
        self.sensor = Some(output.sensor);
        let sealed = output.energy.seal();

        let reading = MeterReading {
            energy_wh_raw: sealed.energy_wh(),
            duration_s: positive_duration(stopped_at.duration_since(started_at).as_secs_f64()),
            sampling_ms,
            baseline_watts,
            sample_count: sealed.sample_count,
            failed_samples: sealed.failed_samples,
            sensor: Some(self.name.clone()),
        };

        if reading.sample_count == 0 {
            tracing::warn!(
                sensor = %self.name,
                failed = reading.failed_samples,
                "no power sample could be read; reading is unmetered"
            );
        } else if reading.failed_samples > 0 {
            tracing::warn!(
                sensor = %self.name,
                failed = reading.failed_samples,
                ok = reading.sample_count,
                "some power samples could not be read"
            );
        }
        tracing::info!(
            sensor = %self.name,
            energy_wh = reading.energy_wh_raw,
            duration_s = reading.duration_s,
            samples = reading.sample_count,
            "metering stopped"
        );
        Ok(reading)
    }
}

impl Drop for Meter {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            tracing::debug!(sensor = %self.name, "meter dropped while sampling; joining sampler");
            let _ = worker.shutdown();
        }
    }
}

impl std::fmt::Debug for Meter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Meter")
            .field("sensor", &self.name)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("baseline_samples", &self.baseline_samples)
            .finish()
    }
}

/// Averages `samples` successful idle reads taken one interval apart.
fn measure_baseline(sensor: &mut dyn PowerSensor, samples: u32, interval: Duration) -> f64 {
    if samples == 0 {
        return 0.0;
    }
    if sensor.is_cumulative() {
        // Prime so every baseline read is a real interval average.
        let _ = sensor.read_power_watts();
    }

    let mut total = 0.0;
    let mut ok = 0u32;
    for i in 0..samples {
        if i > 0 || sensor.is_cumulative() {
            std::thread::sleep(interval);
        }
        match sensor.read_power_watts() {
            Ok(w) if w.is_finite() => {
                total += w.max(0.0);
                ok += 1;
            }
            Ok(_) => {}
            Err(e) => tracing::debug!("baseline sample skipped: {e}"),
        }
    }

    if ok == 0 {
        tracing::warn!("no baseline samples could be read; baseline correction disabled");
        return 0.0;
    }
    total / f64::from(ok)
}

/// Body of the sampling thread.
///
/// Stop latency is bounded by one in-flight read. Counter sensors take a
/// closing read because their value is the mean since the previous one;
/// instantaneous sensors carry the last watts forward to the stop signal.
fn sampling_loop(
    mut sensor: Box<dyn PowerSensor>,
    interval: Duration,
    counter_origin: Option<Instant>,
    stop_rx: mpsc::Receiver<()>,
) -> SamplerOutput {
    let mut energy = EnergyAccumulator::new();
    loop {
        take_sample(sensor.as_mut(), &mut energy, counter_origin);
        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    if counter_origin.is_some() {
        take_sample(sensor.as_mut(), &mut energy, counter_origin);
    } else {
        energy.extend_to(Instant::now());
    }
    SamplerOutput { sensor, energy }
}

fn take_sample(
    sensor: &mut dyn PowerSensor,
    energy: &mut EnergyAccumulator,
    counter_origin: Option<Instant>,
) {
    match sensor.read_power_watts() {
        Ok(watts) => {
            let sample = PowerSample::new(Instant::now(), watts);
            match counter_origin {
                Some(origin) => energy.record_since(origin, sample),
                None => energy.record(sample),
            };
        }
        Err(e) => {
            energy.record_failure();
            if energy.failed_samples() == 1 {
                tracing::warn!(sensor = sensor.name(), "power sample skipped: {e}");
            } else {
                tracing::debug!(sensor = sensor.name(), "power sample skipped: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use power_sensors::SensorError;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;

    /// Constant-power sensor.
    struct ConstantSensor(f64);

    impl PowerSensor for ConstantSensor {
        fn name(&self) -> &str {
            "constant"
        }
        fn kind(&self) -> SensorKind {
            SensorKind::Nvidia
        }
        fn is_available(&self) -> bool {
            true
        }
        fn read_power_watts(&mut self) -> Result<f64, SensorError> {
            Ok(self.0)
        }
    }

    /// Fails every other read.
    struct FlakySensor {
        reads: Arc<AtomicU64>,
    }

    impl PowerSensor for FlakySensor {
        fn name(&self) -> &str {
            "flaky"
        }
        fn kind(&self) -> SensorKind {
            SensorKind::Rocm
        }
        fn is_available(&self) -> bool {
            true
        }
        fn read_power_watts(&mut self) -> Result<f64, SensorError> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            if n % 2 == 1 {
                Err(SensorError::CommandFailed {
                    command: "flaky".into(),
                    detail: "transient".into(),
                })
            } else {
                Ok(30.0)
            }
        }
    }

    /// Counter-style sensor that reports 0 W on its priming read.
    struct CounterSensor {
        primed: bool,
        watts: f64,
    }

    impl PowerSensor for CounterSensor {
        fn name(&self) -> &str {
            "counter"
        }
        fn kind(&self) -> SensorKind {
            SensorKind::Rapl
        }
        fn is_available(&self) -> bool {
            true
        }
        fn read_power_watts(&mut self) -> Result<f64, SensorError> {
            if !self.primed {
                self.primed = true;
                return Ok(0.0);
            }
            Ok(self.watts)
        }
        fn is_cumulative(&self) -> bool {
            true
        }
        fn reset(&mut self) {
            self.primed = false;
        }
    }

    /// Every read fails.
    struct DeadSensor;

    impl PowerSensor for DeadSensor {
        fn name(&self) -> &str {
            "dead"
        }
        fn kind(&self) -> SensorKind {
            SensorKind::Nvidia
        }
        fn is_available(&self) -> bool {
            true
        }
        fn read_power_watts(&mut self) -> Result<f64, SensorError> {
            Err(SensorError::CommandFailed {
                command: "dead".into(),
                detail: "no device".into(),
            })
        }
    }

    /// Each read blocks for `read_ms`, like a slow vendor CLI.
    struct SlowSensor {
        read_ms: u64,
        reads: Arc<AtomicU64>,
    }

    impl PowerSensor for SlowSensor {
        fn name(&self) -> &str {
            "slow"
        }
        fn kind(&self) -> SensorKind {
            SensorKind::Nvidia
        }
        fn is_available(&self) -> bool {
            true
        }
        fn read_power_watts(&mut self) -> Result<f64, SensorError> {
            std::thread::sleep(Duration::from_millis(self.read_ms));
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(10.0)
        }
    }

    struct PanicSensor;

    impl PowerSensor for PanicSensor {
        fn name(&self) -> &str {
            "panic"
        }
        fn kind(&self) -> SensorKind {
            SensorKind::Nvidia
        }
        fn is_available(&self) -> bool {
            true
        }
        fn read_power_watts(&mut self) -> Result<f64, SensorError> {
            panic!("driver exploded");
        }
    }

    /// Flags when dropped, to prove the sampler thread was joined.
    struct DropFlagSensor(Arc<AtomicBool>);

    impl PowerSensor for DropFlagSensor {
        fn name(&self) -> &str {
            "drop-flag"
        }
        fn kind(&self) -> SensorKind {
            SensorKind::Nvidia
        }
        fn is_available(&self) -> bool {
            true
        }
        fn read_power_watts(&mut self) -> Result<f64, SensorError> {
            Ok(1.0)
        }
    }

    impl Drop for DropFlagSensor {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn run_for(meter: &mut Meter, interval_ms: u64, millis: u64) -> MeterReading {
        meter.start(interval_ms).unwrap();
        std::thread::sleep(Duration::from_millis(millis));
        meter.stop().unwrap()
    }

    #[test]
    fn test_stop_without_start() {
        let mut meter = Meter::new(Box::new(ConstantSensor(10.0)));
        assert!(matches!(meter.stop(), Err(MeterError::NotRunning)));
        assert_eq!(meter.state(), MeterState::Idle);
    }

    #[test]
    fn test_double_start() {
        let mut meter = Meter::new(Box::new(ConstantSensor(10.0)));
        meter.start(5).unwrap();
        assert!(matches!(meter.start(5), Err(MeterError::AlreadyRunning)));
        assert_eq!(meter.state(), MeterState::Sampling);
        meter.stop().unwrap();
    }

    #[test]
    fn test_double_stop() {
        let mut meter = Meter::new(Box::new(ConstantSensor(10.0)));
        run_for(&mut meter, 5, 10);
        assert!(matches!(meter.stop(), Err(MeterError::NotRunning)));
        assert_eq!(meter.state(), MeterState::Stopped);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut meter = Meter::new(Box::new(ConstantSensor(10.0)));
        assert!(matches!(meter.start(0), Err(MeterError::InvalidInterval(0))));
        assert_eq!(meter.state(), MeterState::Idle);
        // The sensor was not consumed.
        meter.start(5).unwrap();
        meter.stop().unwrap();
    }

    #[test]
    fn test_constant_power_energy() {
        let mut meter = Meter::new(Box::new(ConstantSensor(20.0)));
        let r = run_for(&mut meter, 10, 300);

        assert_eq!(r.sampling_ms, 10);
        assert!(r.sample_count >= 2);
        assert_eq!(r.failed_samples, 0);
        assert_eq!(r.sensor.as_deref(), Some("constant"));
        assert!(r.is_metered());

        // The integral spans first→last sample, which sits inside the
        // meter's wall-clock window.
        let upper = 20.0 * r.duration_s / 3600.0;
        let lower = 20.0 * (r.duration_s - 0.05) / 3600.0;
        assert!(r.energy_wh_raw <= upper + 1e-9, "{} > {upper}", r.energy_wh_raw);
        assert!(r.energy_wh_raw >= lower, "{} < {lower}", r.energy_wh_raw);
    }

    #[test]
    fn test_failed_samples_are_skipped() {
        let reads = Arc::new(AtomicU64::new(0));
        let mut meter = Meter::new(Box::new(FlakySensor {
            reads: reads.clone(),
        }));
        let r = run_for(&mut meter, 5, 100);
        assert!(r.failed_samples > 0);
        assert!(r.sample_count > 0);
        assert!(r.energy_wh_raw > 0.0);
        assert_eq!(reads.load(Ordering::SeqCst), r.failed_samples + r.sample_count);
    }

    #[test]
    fn test_all_reads_failed_is_unmetered() {
        let mut meter = Meter::new(Box::new(DeadSensor));
        let r = run_for(&mut meter, 5, 50);
        assert_eq!(r.sampling_ms, 5);
        assert_eq!(r.sample_count, 0);
        assert!(r.failed_samples > 0);
        assert_eq!(r.energy_wh_raw, 0.0);
        assert!(!r.is_metered());
    }

    #[test]
    fn test_stop_waits_for_at_most_one_read() {
        let reads = Arc::new(AtomicU64::new(0));
        let mut meter = Meter::new(Box::new(SlowSensor {
            read_ms: 100,
            reads: reads.clone(),
        }));
        meter.start(100).unwrap();
        // Lands mid-way through the second read.
        std::thread::sleep(Duration::from_millis(250));
        let stop_called = Instant::now();
        let r = meter.stop().unwrap();
        let latency = stop_called.elapsed();

        assert!(latency < Duration::from_millis(100), "stop took {latency:?}");
        // No extra read was issued after the stop signal.
        assert_eq!(reads.load(Ordering::SeqCst), r.sample_count);
        // The tail after the last read is still integrated at its watts.
        assert!(r.sample_count >= 2);
        let last_to_stop = 10.0 * (r.duration_s - 0.1) / 3600.0;
        assert!(r.energy_wh_raw >= last_to_stop - 1e-4, "{}", r.energy_wh_raw);
    }

    #[test]
    fn test_reuse_resets_accumulator() {
        let mut meter = Meter::new(Box::new(ConstantSensor(10.0)));
        let first = run_for(&mut meter, 5, 100);
        let second = run_for(&mut meter, 5, 20);
        assert!(second.sample_count < first.sample_count);
        assert!(second.energy_wh_raw < first.energy_wh_raw);
        assert_eq!(meter.state(), MeterState::Stopped);
    }

    #[test]
    fn test_baseline_mean_and_net_clamp() {
        let mut meter = Meter::new(Box::new(ConstantSensor(5.0))).with_baseline_samples(3);
        let r = run_for(&mut meter, 5, 50);
        assert!((r.baseline_watts - 5.0).abs() < 1e-9);
        // Idle-only workload: net is clamped at zero, never negative.
        assert!(r.energy_wh_net() >= 0.0);
        assert!(r.energy_wh_net() < 1e-6);
    }

    #[test]
    fn test_counter_sensor_first_interval_counted() {
        let mut meter = Meter::new(Box::new(CounterSensor {
            primed: false,
            watts: 40.0,
        }));
        let r = run_for(&mut meter, 20, 200);
        let expected = 40.0 * r.duration_s / 3600.0;
        assert!(r.energy_wh_raw <= expected + 1e-9);
        assert!(r.energy_wh_raw >= 40.0 * (r.duration_s - 0.03) / 3600.0);
    }

    #[test]
    fn test_sampler_panic_surfaces() {
        let mut meter = Meter::new(Box::new(PanicSensor));
        meter.start(5).unwrap();
        assert!(matches!(
            meter.stop(),
            Err(MeterError::SamplerPanicked { .. })
        ));
        assert!(matches!(meter.start(5), Err(MeterError::SensorLost)));
    }

    #[test]
    fn test_drop_joins_sampler() {
        let dropped = Arc::new(AtomicBool::new(false));
        let mut meter = Meter::new(Box::new(DropFlagSensor(dropped.clone())));
        meter.start(5).unwrap();
        drop(meter);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_net_energy_worked_example() {
        // 0.02 − 5 · 10 / 3600 = 0.02 − 0.013889 ≈ 0.006111
        let net = net_energy_wh(0.02, 5.0, 10.0);
        assert!((net - 0.006_111_1).abs() < 1e-6);
    }

    #[test]
    fn test_net_energy_never_negative() {
        assert_eq!(net_energy_wh(0.001, 100.0, 60.0), 0.0);
        assert_eq!(net_energy_wh(f64::NAN, 1.0, 1.0), 0.0);
    }

    #[test]
    fn test_unmetered_sentinel() {
        let r = MeterReading::unmetered(0.0);
        assert_eq!(r.sampling_ms, 0);
        assert_eq!(r.energy_wh_raw, 0.0);
        assert!(r.duration_s > 0.0);
        assert!(!r.is_metered());
        assert!(r.sensor.is_none());
    }

    #[test]
    fn test_debug_format() {
        let meter = Meter::new(Box::new(ConstantSensor(1.0))).with_baseline_samples(2);
        let debug = format!("{meter:?}");
        assert!(debug.contains("constant"));
        assert!(debug.contains("Idle"));
    }
}
