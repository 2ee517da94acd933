// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: selector → session → calculator.
//!
//! These drive the public API end to end with in-memory sensors and
//! generate doubles, plus a fake powercap tree for the RAPL adapter.

use energy_meter::{
    select_from, BenchConfig, EnergyMeter, GenerateError, GenerationOutcome, MeasurementKind,
    MeasurementSession, Meter, MeterSelection, MeterState, MetricsCalculator, MetricsSummary,
    SessionError,
};
use power_sensors::{Platform, PowerSensor, RaplSensor, SensorError, SensorKind};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── Helpers ────────────────────────────────────────────────────

struct FakeSensor {
    kind: SensorKind,
    available: bool,
    watts: f64,
}

impl FakeSensor {
    fn boxed(kind: SensorKind, available: bool, watts: f64) -> Box<dyn PowerSensor> {
        Box::new(Self {
            kind,
            available,
            watts,
        })
    }
}

impl PowerSensor for FakeSensor {
    fn name(&self) -> &str {
        self.kind.as_str()
    }
    fn kind(&self) -> SensorKind {
        self.kind
    }
    fn is_available(&self) -> bool {
        self.available
    }
    fn read_power_watts(&mut self) -> Result<f64, SensorError> {
        Ok(self.watts)
    }
}

/// Detected as present but never readable, like a GPU whose driver
/// reports `[N/A]` for power.
struct UnreadableSensor;

impl PowerSensor for UnreadableSensor {
    fn name(&self) -> &str {
        "unreadable"
    }
    fn kind(&self) -> SensorKind {
        SensorKind::Nvidia
    }
    fn is_available(&self) -> bool {
        true
    }
    fn read_power_watts(&mut self) -> Result<f64, SensorError> {
        Err(SensorError::ParseError {
            origin: "power.draw".to_string(),
            detail: "[N/A]".to_string(),
        })
    }
}

fn sleepy_generator(
    millis: u64,
) -> impl FnMut(&str) -> Result<GenerationOutcome, GenerateError> {
    move |prompt: &str| {
        std::thread::sleep(Duration::from_millis(millis));
        Ok(GenerationOutcome::new(format!("answer to {prompt}"), 20, 80))
    }
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir()
        .join("energy_meter_it")
        .join(format!("{name}_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

// ── Full Pipeline ──────────────────────────────────────────────

#[test]
fn test_pipeline_gpu_preferred_over_rapl() {
    let selected = select_from(vec![
        FakeSensor::boxed(SensorKind::Nvidia, true, 150.0),
        FakeSensor::boxed(SensorKind::Rocm, false, 0.0),
        FakeSensor::boxed(SensorKind::Rapl, true, 30.0),
    ])
    .unwrap();
    assert_eq!(selected.kind(), SensorKind::Nvidia);

    let mut selection = MeterSelection::Metered(Meter::new(selected));
    let session = MeasurementSession::new(10);
    let mut generator = sleepy_generator(150);

    let out = session
        .run(selection.meter_mut(), &mut generator, "q1")
        .unwrap();
    let record = MetricsCalculator::new(350.0).calculate(&out.reading, &out.outcome);

    assert_eq!(record.measurement, MeasurementKind::Measured);
    assert_eq!(record.sensor.as_deref(), Some("nvidia"));
    assert_eq!(record.total_tokens, 100);
    assert!(record.energy_wh_raw > 0.0);
    // Never more than 150 W over the whole meter window.
    assert!(record.energy_wh_raw <= 150.0 * record.duration_s / 3600.0 + 1e-9);
    assert!((record.g_co2 - record.energy_wh_net / 1000.0 * 350.0).abs() < 1e-12);
    assert!(record.response_time_s >= 0.149);
}

#[test]
fn test_pipeline_unavailable_is_estimated() {
    let mut selection = energy_meter::select_meter_for(Platform::Other, &BenchConfig::default());
    assert!(!selection.is_metered());

    let session = MeasurementSession::default();
    let mut generator = sleepy_generator(5);
    let out = session
        .run(selection.meter_mut(), &mut generator, "q")
        .unwrap();
    let record = MetricsCalculator::default().calculate(&out.reading, &out.outcome);

    assert_eq!(record.measurement, MeasurementKind::Estimated);
    assert_eq!(record.sampling_ms, 0);
    assert_eq!(record.energy_wh_raw, 0.0);
    assert_eq!(record.g_co2, 0.0);
    assert!(record.duration_s > 0.0);
}

#[test]
fn test_pipeline_unreadable_sensor_is_estimated() {
    let mut selection = MeterSelection::Metered(Meter::new(Box::new(UnreadableSensor)));
    let session = MeasurementSession::new(5);
    let mut generator = sleepy_generator(40);
    let out = session
        .run(selection.meter_mut(), &mut generator, "q")
        .unwrap();
    let record = MetricsCalculator::default().calculate(&out.reading, &out.outcome);

    assert_eq!(out.reading.sample_count, 0);
    assert!(out.reading.failed_samples > 0);
    assert_eq!(record.measurement, MeasurementKind::Estimated);
    assert_eq!(record.energy_wh_raw, 0.0);
}

#[test]
fn test_failed_generation_then_reuse() {
    let mut meter = Meter::new(FakeSensor::boxed(SensorKind::Rocm, true, 50.0));
    let session = MeasurementSession::new(5);

    let mut failing = |_: &str| -> Result<GenerationOutcome, GenerateError> {
        std::thread::sleep(Duration::from_millis(30));
        Err(GenerateError::Timeout { seconds: 0.03 })
    };
    let err = session.run(Some(&mut meter), &mut failing, "q").unwrap_err();
    let partial = match &err {
        SessionError::GenerationFailed { reading, .. } => reading.clone(),
        other => panic!("unexpected error: {other}"),
    };
    assert!(partial.energy_wh_raw > 0.0);
    assert_eq!(meter.state(), MeterState::Stopped);

    // Same meter, next prompt.
    let mut generator = sleepy_generator(20);
    let out = session.run(Some(&mut meter), &mut generator, "q2").unwrap();
    assert!(out.reading.energy_wh_raw > 0.0);
    assert_eq!(meter.state(), MeterState::Stopped);
}

#[test]
fn test_batch_summary_over_sessions() {
    let mut meter = Meter::new(FakeSensor::boxed(SensorKind::Nvidia, true, 100.0));
    let session = MeasurementSession::new(5);
    let calc = MetricsCalculator::new(200.0).with_region("test");

    let mut records = Vec::new();
    for prompt in ["a", "b", "c"] {
        let mut generator = sleepy_generator(15);
        let out = session.run(Some(&mut meter), &mut generator, prompt).unwrap();
        records.push(calc.calculate(&out.reading, &out.outcome));
    }

    let summary = MetricsSummary::from_records(&records);
    assert_eq!(summary.runs, 3);
    assert_eq!(summary.measured_runs, 3);
    assert_eq!(summary.total_tokens, 300);
    assert!(summary.total_energy_wh_net > 0.0);
    assert!(records.iter().all(|r| r.region == "test"));
}

// ── RAPL Counters ──────────────────────────────────────────────

#[test]
fn test_rapl_meter_over_fake_powercap() {
    let root = temp_dir("rapl_meter");
    let zone = root.join("intel-rapl:0");
    fs::create_dir_all(&zone).unwrap();
    fs::write(zone.join("name"), "package-0\n").unwrap();
    fs::write(zone.join("max_energy_range_uj"), "262143328850\n").unwrap();
    let energy_path = zone.join("energy_uj");
    fs::write(&energy_path, "1000000\n").unwrap();

    let sensor = RaplSensor::with_root(&root);
    assert!(sensor.is_available());
    let mut meter = Meter::new(Box::new(sensor));

    // Advance the counter while the meter runs.
    let done = Arc::new(AtomicBool::new(false));
    let writer = {
        let done = done.clone();
        let energy_path = energy_path.clone();
        std::thread::spawn(move || {
            let mut uj: u64 = 1_000_000;
            while !done.load(Ordering::SeqCst) {
                uj += 100_000;
                let _ = fs::write(&energy_path, format!("{uj}\n"));
                std::thread::sleep(Duration::from_millis(5));
            }
        })
    };

    meter.start(10).unwrap();
    std::thread::sleep(Duration::from_millis(200));
    let reading = meter.stop().unwrap();
    done.store(true, Ordering::SeqCst);
    writer.join().unwrap();

    assert!(reading.energy_wh_raw.is_finite());
    assert!(reading.energy_wh_raw > 0.0);
    assert_eq!(reading.sensor.as_deref(), Some("RAPL (CPU package)"));

    let _ = fs::remove_dir_all(&root);
}

// ── Config ─────────────────────────────────────────────────────

#[test]
fn test_config_toml_roundtrip() {
    let config = BenchConfig {
        sampling_interval_ms: 250,
        co2_intensity_g_per_kwh: 42.0,
        platform_hint: "linux".to_string(),
        baseline_samples: 3,
        region: "se".to_string(),
    };
    let toml = config.to_toml().unwrap();
    let back = BenchConfig::from_toml(&toml).unwrap();
    assert_eq!(config, back);
    assert_eq!(back.resolve_platform().unwrap(), Platform::Linux);
}
