// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `energy-bench status`: show the host and its power sensors.
//!
//! Probes every adapter for the platform in priority order, not just
//! up to the first hit, so the output shows what the selector skipped.

use energy_meter::{build_sensor, priority_for, select_meter_for, BenchConfig};
use power_sensors::DeviceInfo;

pub async fn execute(config: BenchConfig) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || report(&config)).await?
}

fn report(config: &BenchConfig) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║            energy-bench · Sensor Status             ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let platform = config.resolve_platform()?;
    let device = DeviceInfo::detect_for(platform);

    // ── Device ─────────────────────────────────────────────────
    println!("  Device");
    println!("   Name:         {}", device.device_name);
    println!("   Type:         {:?}", device.device_type);
    println!("   OS:           {} {}", device.os_name, device.os_version);
    if let Some(cpu) = &device.cpu_model {
        println!("   CPU:          {cpu}");
    }
    if let Some(gpu) = &device.gpu_model {
        println!("   GPU:          {gpu}");
    }
    if let Some(ram) = device.ram_gb {
        println!("   RAM:          {ram:.1} GB");
    }
    if let Some(arch) = &device.chip_architecture {
        println!("   Arch:         {arch}");
    }
    println!();

    // ── Sensors ────────────────────────────────────────────────
    println!("  Power sensors ({platform}, priority order)");
    let kinds = priority_for(platform);
    if kinds.is_empty() {
        println!("   (no adapters for this platform)");
    }
    for (rank, &kind) in kinds.iter().enumerate() {
        let sensor = build_sensor(kind, config);
        let mark = if sensor.is_available() { "available" } else { "-" };
        println!("   {}. {:<24} {mark}", rank + 1, sensor.name());
    }
    println!();

    // ── Selection ──────────────────────────────────────────────
    println!("  Selection");
    let selection = select_meter_for(platform, config);
    match selection.sensor_name() {
        Some(name) => println!("   Meter:        {name}"),
        None => println!("   Meter:        none (records will be marked estimated)"),
    }
    println!("   Interval:     {} ms", config.sampling_interval_ms);
    if config.baseline_samples > 0 {
        println!("   Baseline:     {} samples", config.baseline_samples);
    } else {
        println!("   Baseline:     disabled");
    }
    println!();

    Ok(())
}
