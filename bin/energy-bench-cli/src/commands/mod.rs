// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Subcommands and their shared setup.

pub mod run;
pub mod status;

use anyhow::Context;
use energy_meter::BenchConfig;
use std::path::Path;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the level follows `-v` count.
pub fn init_tracing(verbose: u8) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn default_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// File (or defaults) → environment overrides → validation.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<BenchConfig> {
    let config = match path {
        Some(path) => BenchConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => BenchConfig::default(),
    };
    let config = config.apply_env().context("applying environment overrides")?;
    config.validate().context("invalid configuration")?;
    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}

/// Truncates to at most `max_chars` characters with an ellipsis.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_level() {
        assert_eq!(default_level(0), "warn");
        assert_eq!(default_level(1), "info");
        assert_eq!(default_level(2), "debug");
        assert_eq!(default_level(9), "trace");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
        // Multi-byte characters are never split.
        assert_eq!(truncate("ééééééééé", 5), "éé...");
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Some(Path::new("/nonexistent/energy-bench.toml"))).unwrap_err();
        assert!(format!("{err:#}").contains("nonexistent"));
    }
}
