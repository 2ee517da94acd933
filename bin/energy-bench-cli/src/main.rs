// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # energy-bench
//!
//! Measures the energy drawn by text-generation requests against a local
//! or remote model endpoint.
//!
//! ## Usage
//! ```bash
//! # One prompt against a local Ollama server
//! energy-bench run --model llama3.2 --prompt "Explain RAPL in one paragraph"
//!
//! # A whole test set against an OpenAI-compatible endpoint
//! energy-bench run --provider openai --model gpt-4o-mini --test-set sets/easy.json
//!
//! # Which power sensor would be used on this host?
//! energy-bench status
//! ```

mod commands;
mod output;
mod providers;
mod testset;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "energy-bench",
    about = "Energy benchmark for text-generation requests",
    version,
    author
)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run prompts under an energy meter and write the records.
    Run(commands::run::RunArgs),

    /// Show the detected device and which power sensor would be used.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(config, args).await,
        Commands::Status => commands::status::execute(config).await,
    }
}
