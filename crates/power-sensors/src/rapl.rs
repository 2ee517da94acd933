// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! CPU package energy via the Linux powercap RAPL interface.
//!
//! Each top-level zone (`/sys/class/powercap/intel-rapl:N`) exposes a
//! monotonically increasing `energy_uj` counter that wraps at
//! `max_energy_range_uj`. Subzones (`intel-rapl:N:M`, core/uncore/dram)
//! are already included in their package total and are skipped.
//!
//! Power is derived by differencing two counter reads over the elapsed
//! monotonic interval. A negative delta is treated as exactly one wrap;
//! a delta that is still implausible after correction yields 0 W for
//! that sample.

use crate::sensor::{PowerSensor, SensorKind};
use crate::SensorError;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Default powercap root.
const POWERCAP_ROOT: &str = "/sys/class/powercap";

/// Counter width assumed when a zone does not report `max_energy_range_uj`.
const DEFAULT_MAX_RANGE_UJ: u64 = 1 << 32;

/// One package-level RAPL zone.
#[derive(Debug, Clone)]
struct RaplZone {
    energy_path: PathBuf,
    max_range_uj: u64,
}

/// Previous counter state used for differencing.
#[derive(Debug, Clone)]
struct CounterState {
    energies_uj: Vec<u64>,
    at: Instant,
}

/// Reads CPU package power from RAPL energy counters.
#[derive(Debug)]
pub struct RaplSensor {
    root: PathBuf,
    zones: Vec<RaplZone>,
    last: Option<CounterState>,
}

impl RaplSensor {
    /// Creates a sensor over the default powercap root.
    pub fn new() -> Self {
        Self::with_root(POWERCAP_ROOT)
    }

    /// Creates a sensor over an alternative powercap root (for testing).
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let zones = discover_zones(&root);
        Self {
            root,
            zones,
            last: None,
        }
    }

    /// Number of package zones found.
    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    fn read_counters(&self) -> Result<Vec<u64>, SensorError> {
        self.zones
            .iter()
            .map(|zone| read_counter(&zone.energy_path))
            .collect()
    }
}

impl Default for RaplSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerSensor for RaplSensor {
    fn name(&self) -> &str {
        "RAPL (CPU package)"
    }

    fn kind(&self) -> SensorKind {
        SensorKind::Rapl
    }

    fn is_available(&self) -> bool {
        !self.zones.is_empty()
            && self
                .zones
                .iter()
                .all(|z| std::fs::File::open(&z.energy_path).is_ok())
    }

    fn read_power_watts(&mut self) -> Result<f64, SensorError> {
        if self.zones.is_empty() {
            return Err(SensorError::NotAvailable {
                sensor: format!("rapl ({})", self.root.display()),
            });
        }

        let energies_uj = self.read_counters()?;
        let at = Instant::now();

        let watts = match self.last.as_ref() {
            None => 0.0,
            Some(prev) => {
                let elapsed_s = at.duration_since(prev.at).as_secs_f64();
                let delta_uj: u64 = self
                    .zones
                    .iter()
                    .zip(prev.energies_uj.iter().zip(&energies_uj))
                    .map(|(zone, (&before, &after))| {
                        counter_delta(before, after, zone.max_range_uj)
                    })
                    .sum();
                if elapsed_s > 0.0 {
                    delta_uj as f64 / 1_000_000.0 / elapsed_s
                } else {
                    0.0
                }
            }
        };

        self.last = Some(CounterState { energies_uj, at });
        Ok(watts)
    }

    fn is_cumulative(&self) -> bool {
        true
    }

    fn reset(&mut self) {
        self.last = None;
    }
}

/// Computes a counter delta in µJ, correcting for a single wraparound.
///
/// Returns 0 when the corrected delta still exceeds the counter range,
/// which means the counter was reset or wrapped more than once.
pub(crate) fn counter_delta(before: u64, after: u64, max_range_uj: u64) -> u64 {
    if after >= before {
        return after - before;
    }
    let wrapped = max_range_uj.saturating_sub(before).saturating_add(after);
    if wrapped > max_range_uj || before > max_range_uj {
        tracing::warn!(before, after, max_range_uj, "implausible RAPL counter delta; reporting 0 W");
        return 0;
    }
    wrapped
}

/// Lists package-level zones (`intel-rapl:N`, also `amd-rapl:N` on some
/// kernels) that expose an `energy_uj` counter, sorted by name.
fn discover_zones(root: &Path) -> Vec<RaplZone> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| is_package_zone(&e.file_name().to_string_lossy()))
        .map(|e| e.path())
        .filter(|p| p.join("energy_uj").exists())
        .collect();
    dirs.sort();

    dirs.into_iter()
        .map(|dir| {
            let max_range_uj = read_sysfs_file(&dir.join("max_energy_range_uj"))
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|&v| v > 0)
                .unwrap_or(DEFAULT_MAX_RANGE_UJ);
            RaplZone {
                energy_path: dir.join("energy_uj"),
                max_range_uj,
            }
        })
        .collect()
}

/// `intel-rapl:0` is a package zone; `intel-rapl:0:1` is a subzone.
fn is_package_zone(name: &str) -> bool {
    let Some((prefix, rest)) = name.split_once(':') else {
        return false;
    };
    prefix.ends_with("-rapl") && !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

fn read_counter(path: &Path) -> Result<u64, SensorError> {
    let content = read_sysfs_file(path)?;
    content.parse::<u64>().map_err(|_| SensorError::ParseError {
        origin: path.display().to_string(),
        detail: format!("expected integer microjoules, got '{content}'"),
    })
}

/// Reads a sysfs/procfs file and returns its trimmed content.
///
/// Shared by the RAPL adapter and device detection.
pub(crate) fn read_sysfs_file(path: &Path) -> Result<String, SensorError> {
    if !path.exists() {
        return Err(SensorError::NotAvailable {
            sensor: path.display().to_string(),
        });
    }
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| SensorError::ReadError {
            path: path.display().to_string(),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a fake powercap tree under the temp dir and returns its root.
    fn fake_powercap(name: &str, zones: &[(&str, u64, Option<u64>)]) -> PathBuf {
        let root = std::env::temp_dir().join("energy_bench_test").join(name);
        let _ = std::fs::remove_dir_all(&root);
        for (zone, energy, max) in zones {
            let dir = root.join(zone);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("energy_uj"), format!("{energy}\n")).unwrap();
            if let Some(max) = max {
                std::fs::write(dir.join("max_energy_range_uj"), format!("{max}\n")).unwrap();
            }
        }
        root
    }

    fn set_energy(root: &Path, zone: &str, energy: u64) {
        std::fs::write(root.join(zone).join("energy_uj"), format!("{energy}\n")).unwrap();
    }

    #[test]
    fn test_counter_delta_plain() {
        assert_eq!(counter_delta(100, 250, 1000), 150);
        assert_eq!(counter_delta(100, 100, 1000), 0);
    }

    #[test]
    fn test_counter_delta_single_wrap() {
        // 900 → wrap at 1000 → 50: 100 + 50.
        assert_eq!(counter_delta(900, 50, 1000), 150);
    }

    #[test]
    fn test_counter_delta_implausible() {
        // Previous value above the declared range cannot be a single wrap.
        assert_eq!(counter_delta(5000, 10, 1000), 0);
    }

    #[test]
    fn test_is_package_zone() {
        assert!(is_package_zone("intel-rapl:0"));
        assert!(is_package_zone("intel-rapl:1"));
        assert!(is_package_zone("amd-rapl:0"));
        assert!(!is_package_zone("intel-rapl:0:1"));
        assert!(!is_package_zone("intel-rapl"));
        assert!(!is_package_zone("dtpm"));
    }

    #[test]
    fn test_discovery_skips_subzones() {
        let root = fake_powercap(
            "discover",
            &[
                ("intel-rapl:0", 10, Some(1000)),
                ("intel-rapl:0:0", 5, Some(1000)),
                ("intel-rapl:1", 20, None),
            ],
        );
        let sensor = RaplSensor::with_root(&root);
        assert_eq!(sensor.zone_count(), 2);
        assert!(sensor.is_available());
        assert_eq!(sensor.zones[1].max_range_uj, DEFAULT_MAX_RANGE_UJ);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_missing_root_unavailable() {
        let sensor = RaplSensor::with_root("/nonexistent/powercap");
        assert!(!sensor.is_available());
        assert_eq!(sensor.zone_count(), 0);
    }

    #[test]
    fn test_read_without_zones_fails() {
        let mut sensor = RaplSensor::with_root("/nonexistent/powercap");
        assert!(matches!(
            sensor.read_power_watts(),
            Err(SensorError::NotAvailable { .. })
        ));
    }

    #[test]
    fn test_first_read_primes_counter() {
        let root = fake_powercap("prime", &[("intel-rapl:0", 1_000_000, Some(u64::MAX))]);
        let mut sensor = RaplSensor::with_root(&root);
        assert_eq!(sensor.read_power_watts().unwrap(), 0.0);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_power_from_counter_difference() {
        let root = fake_powercap("diff", &[("intel-rapl:0", 0, Some(u64::MAX))]);
        let mut sensor = RaplSensor::with_root(&root);
        sensor.read_power_watts().unwrap();

        // Backdate the previous read by 1 s and add 15 J.
        if let Some(last) = sensor.last.as_mut() {
            last.at -= std::time::Duration::from_secs(1);
        }
        set_energy(&root, "intel-rapl:0", 15_000_000);

        let watts = sensor.read_power_watts().unwrap();
        assert!((watts - 15.0).abs() < 0.1, "got {watts}");
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_reset_forgets_previous_counter() {
        let root = fake_powercap("reset", &[("intel-rapl:0", 500, Some(u64::MAX))]);
        let mut sensor = RaplSensor::with_root(&root);
        sensor.read_power_watts().unwrap();
        sensor.reset();
        assert!(sensor.last.is_none());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_unparseable_counter() {
        let root = fake_powercap("garbage", &[("intel-rapl:0", 0, None)]);
        std::fs::write(root.join("intel-rapl:0").join("energy_uj"), "garbage").unwrap();
        let mut sensor = RaplSensor::with_root(&root);
        assert!(matches!(
            sensor.read_power_watts(),
            Err(SensorError::ParseError { .. })
        ));
        let _ = std::fs::remove_dir_all(&root);
    }
}
