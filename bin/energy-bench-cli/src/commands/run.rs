// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `energy-bench run`: measure each prompt of a test set.
//!
//! ```text
//! config → device → check_connection → select_meter → [session → calculate]* → results.json
//! ```
//! Sessions block on HTTP and on the sampling thread, so the whole loop
//! runs on tokio's blocking pool.

use super::truncate;
use crate::output::{write_results, ResultRow};
use crate::providers::{build_client, ClientOptions, Provider};
use crate::testset::TestSet;
use anyhow::Context;
use energy_meter::{
    select_meter_for, BenchConfig, MeasurementSession, MetricsCalculator, MetricsSummary,
    SessionError,
};
use power_sensors::{ApplePowermetricsSensor, DeviceInfo, DeviceType, Platform};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, clap::Args)]
pub struct RunArgs {
    /// Model name as known to the provider.
    #[arg(short, long)]
    pub model: String,

    /// A single prompt to measure.
    #[arg(short, long, conflicts_with = "test_set", required_unless_present = "test_set")]
    pub prompt: Option<String>,

    /// Test set: a JSON file path or a name such as `easy`.
    #[arg(short, long)]
    pub test_set: Option<String>,

    /// Directory searched when --test-set is a name.
    #[arg(long, default_value = "testsets")]
    pub testset_dir: PathBuf,

    /// Endpoint family.
    #[arg(long, value_enum, default_value_t = Provider::Ollama)]
    pub provider: Provider,

    /// Endpoint base URL (defaults per provider).
    #[arg(long)]
    pub base_url: Option<String>,

    /// API key for the openai provider (falls back to OPENAI_API_KEY).
    #[arg(long)]
    pub api_key: Option<String>,

    /// Results file.
    #[arg(short, long, default_value = "results/output.json")]
    pub output: PathBuf,

    /// Overrides the detected device name.
    #[arg(long)]
    pub device_name: Option<String>,

    /// Overrides the detected device type: apple, nvidia, amd, intel, unknown.
    #[arg(long)]
    pub device_type: Option<DeviceType>,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 300)]
    pub timeout_secs: u64,
}

pub async fn execute(config: BenchConfig, args: RunArgs) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║          energy-bench · Measurement Runner          ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let set = match (&args.prompt, &args.test_set) {
        (Some(prompt), _) => TestSet::single(prompt.clone()),
        (None, Some(arg)) => TestSet::load(arg, &args.testset_dir)?,
        (None, None) => anyhow::bail!("either --prompt or --test-set is required"),
    };

    tokio::task::spawn_blocking(move || run_blocking(config, args, set))
        .await
        .context("benchmark task panicked")?
}

fn run_blocking(config: BenchConfig, args: RunArgs, set: TestSet) -> anyhow::Result<()> {
    let platform = config.resolve_platform()?;
    let device = DeviceInfo::detect_for(platform)
        .with_overrides(args.device_name.clone(), args.device_type);

    println!("  Config:");
    println!("   Provider: {} ({})", args.provider, args.model);
    println!("   Device:   {} [{:?}]", device.device_name, device.device_type);
    println!("   Interval: {} ms", config.sampling_interval_ms);
    println!("   CO2:      {} g/kWh ({})", config.co2_intensity_g_per_kwh, config.region);
    println!("   Prompts:  {}", set.len());

    let options = ClientOptions {
        model: args.model.clone(),
        base_url: args.base_url.clone(),
        api_key: args.api_key.clone(),
        timeout: Duration::from_secs(args.timeout_secs),
    };
    let mut client = build_client(args.provider, &options)?;
    client
        .check_connection()
        .with_context(|| format!("{} endpoint is not reachable", args.provider))?;
    println!("   Endpoint: connected");

    if platform == Platform::MacOs {
        authenticate_powermetrics();
    }

    let mut selection = select_meter_for(platform, &config);
    match selection.sensor_name() {
        Some(name) => println!("   Sensor:   {name}"),
        None => {
            println!("   Sensor:   none available on {platform}; records will be marked estimated")
        }
    }
    println!();

    let session = MeasurementSession::new(config.sampling_interval_ms);
    let calculator = MetricsCalculator::from_config(&config).with_device(device);
    let mut rows = Vec::with_capacity(set.len());

    for (idx, question) in set.questions.iter().enumerate() {
        println!(
            "  [{}/{}] {}: \"{}\"",
            idx + 1,
            set.len(),
            question.id.as_deref().unwrap_or("no-id"),
            truncate(question.prompt(), 60),
        );

        match session.run(selection.meter_mut(), client.as_mut(), question.prompt()) {
            Ok(out) => {
                let record = calculator.calculate(&out.reading, &out.outcome);
                println!("        {}", record.summary());
                rows.push(ResultRow::new(
                    record,
                    out.outcome.text,
                    args.provider.as_str(),
                    &args.model,
                    &set,
                    question,
                ));
            }
            Err(SessionError::GenerationFailed { reading, source }) => {
                println!("        FAILED: {source}");
                tracing::warn!(
                    energy_wh = reading.energy_wh_raw,
                    duration_s = reading.duration_s,
                    "generation failed; partial reading discarded"
                );
            }
            Err(e) => return Err(e).context("metering failed"),
        }
    }
    println!();

    if rows.is_empty() {
        anyhow::bail!("no prompt completed successfully; nothing written");
    }

    let records: Vec<_> = rows.iter().map(|r| r.record.clone()).collect();
    print_summary(&MetricsSummary::from_records(&records));

    write_results(&args.output, &rows)?;
    println!("  Results written to {}", args.output.display());
    Ok(())
}

/// Caches sudo credentials so the non-interactive powermetrics reads and
/// its availability check succeed. On refusal the run continues and falls
/// back to the next sensor or to estimated records.
fn authenticate_powermetrics() {
    if !ApplePowermetricsSensor::new().requires_sudo() {
        return;
    }
    println!("   Sudo:     powermetrics needs root; requesting credentials");
    match ApplePowermetricsSensor::authenticate_sudo() {
        Ok(()) => println!("   Sudo:     credentials cached"),
        Err(e) => {
            println!("   Sudo:     not granted ({e})");
            tracing::warn!("sudo authentication failed: {e}");
        }
    }
}

fn print_summary(summary: &MetricsSummary) {
    println!("  Summary:");
    println!(
        "   Runs:          {} ({} measured)",
        summary.runs, summary.measured_runs
    );
    println!("   Energy (net):  {:.6} Wh", summary.total_energy_wh_net);
    println!("   Tokens:        {}", summary.total_tokens);
    println!("   Wh / 1k tok:   {:.6}", summary.wh_per_1k_tokens);
    println!("   CO2:           {:.6} g", summary.total_g_co2);
    println!("   Throughput:    {:.1} tok/s (mean)", summary.mean_tokens_per_second);
    println!();
}
