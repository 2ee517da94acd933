// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Device descriptors for attributing benchmark results to hardware.
//!
//! Detection is best-effort: every probe that fails leaves its field
//! unset rather than failing the whole descriptor.
//!
//! - **Linux**: `/proc/cpuinfo`, `/proc/meminfo`, `/proc/sys/kernel/osrelease`,
//!   then `nvidia-smi` and `rocm-smi` for the GPU model.
//! - **macOS**: `sysctl` and `sw_vers`.

use crate::platform::Platform;
use crate::rapl::read_sysfs_file;
use crate::sensor::run_command;
use std::path::Path;

const CPUINFO_PATH: &str = "/proc/cpuinfo";
const MEMINFO_PATH: &str = "/proc/meminfo";
const OSRELEASE_PATH: &str = "/proc/sys/kernel/osrelease";

/// Coarse hardware vendor category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Apple,
    Nvidia,
    Amd,
    Intel,
    Unknown,
}

impl std::str::FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "apple" => Ok(DeviceType::Apple),
            "nvidia" => Ok(DeviceType::Nvidia),
            "amd" => Ok(DeviceType::Amd),
            "intel" => Ok(DeviceType::Intel),
            "unknown" => Ok(DeviceType::Unknown),
            other => Err(format!(
                "unknown device type '{other}'; expected apple, nvidia, amd, intel, or unknown"
            )),
        }
    }
}

/// Hardware description attached to every published record.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DeviceInfo {
    /// Human-readable name, e.g. `"Linux with NVIDIA GeForce RTX 4090"`.
    pub device_name: String,
    pub device_type: DeviceType,
    pub os_name: String,
    pub os_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ram_gb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chip_architecture: Option<String>,
}

impl DeviceInfo {
    /// Detects the current host.
    pub fn detect() -> Self {
        Self::detect_for(Platform::current())
    }

    pub fn detect_for(platform: Platform) -> Self {
        let info = match platform {
            Platform::Linux => detect_linux(),
            Platform::MacOs => detect_macos(),
            Platform::Other => Self::unknown(),
        };
        tracing::debug!(device = %info.device_name, kind = ?info.device_type, "device detected");
        info
    }

    /// Applies user-supplied overrides for the name and type.
    pub fn with_overrides(mut self, name: Option<String>, device_type: Option<DeviceType>) -> Self {
        if let Some(name) = name {
            self.device_name = name;
        }
        if let Some(t) = device_type {
            self.device_type = t;
        }
        self
    }

    fn unknown() -> Self {
        Self {
            device_name: format!("Unknown ({})", std::env::consts::OS),
            device_type: DeviceType::Unknown,
            os_name: std::env::consts::OS.to_string(),
            os_version: "unknown".to_string(),
            cpu_model: None,
            gpu_model: None,
            ram_gb: None,
            chip_architecture: Some(std::env::consts::ARCH.to_string()),
        }
    }
}

fn detect_linux() -> DeviceInfo {
    let arch = std::env::consts::ARCH.to_string();
    let cpu_model = std::fs::read_to_string(CPUINFO_PATH)
        .ok()
        .and_then(|c| parse_cpu_model(&c));
    let ram_gb = std::fs::read_to_string(MEMINFO_PATH)
        .ok()
        .and_then(|c| parse_mem_total_kb(&c))
        .map(kb_to_gb);
    let os_version = read_sysfs_file(Path::new(OSRELEASE_PATH)).unwrap_or_else(|_| "unknown".into());

    let (gpu_model, gpu_type) = detect_linux_gpu();
    let device_type = gpu_type.unwrap_or_else(|| classify_cpu(cpu_model.as_deref()));

    let device_name = match (&gpu_model, &cpu_model) {
        (Some(gpu), _) => format!("Linux with {gpu}"),
        (None, Some(cpu)) => format!("Linux with {}", short_cpu_name(cpu)),
        (None, None) => format!("Linux ({arch})"),
    };

    DeviceInfo {
        device_name,
        device_type,
        os_name: "Linux".to_string(),
        os_version,
        cpu_model,
        gpu_model,
        ram_gb,
        chip_architecture: Some(arch),
    }
}

fn detect_linux_gpu() -> (Option<String>, Option<DeviceType>) {
    if let Ok(out) = run_command("nvidia-smi", &["--query-gpu=name", "--format=csv,noheader"]) {
        if let Some(name) = out.lines().map(str::trim).find(|l| !l.is_empty()) {
            return (Some(name.to_string()), Some(DeviceType::Nvidia));
        }
    }
    if let Ok(out) = run_command("rocm-smi", &["--showproductname"]) {
        if let Some(line) = out
            .lines()
            .find(|l| l.contains("Card series") || l.contains("Radeon") || l.contains("Instinct"))
        {
            let name = line.rsplit(':').next().unwrap_or(line).trim();
            return (Some(name.to_string()), Some(DeviceType::Amd));
        }
    }
    (None, None)
}

fn detect_macos() -> DeviceInfo {
    let arch = std::env::consts::ARCH.to_string();
    let hw_model = run_command("sysctl", &["-n", "hw.model"]).unwrap_or_else(|_| "Unknown Mac".into());
    let cpu_brand = run_command("sysctl", &["-n", "machdep.cpu.brand_string"]).ok();
    let os_version = run_command("sw_vers", &["-productVersion"]).unwrap_or_else(|_| "unknown".into());
    let ram_gb = run_command("sysctl", &["-n", "hw.memsize"])
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(|bytes| round1(bytes as f64 / (1024.0 * 1024.0 * 1024.0)));

    let apple_silicon = arch == "aarch64"
        || cpu_brand.as_deref().map(|b| b.contains("Apple")).unwrap_or(false);

    let (device_type, cpu_model, gpu_model) = if apple_silicon {
        let chip = cpu_brand.clone().unwrap_or_else(|| "Apple Silicon".to_string());
        (DeviceType::Apple, Some(chip.clone()), Some(chip))
    } else {
        (DeviceType::Intel, cpu_brand.clone(), None)
    };

    let device_name = match (&cpu_model, apple_silicon) {
        (Some(chip), true) => format!("{chip} Mac ({hw_model})"),
        _ => format!("Mac ({hw_model})"),
    };

    DeviceInfo {
        device_name,
        device_type,
        os_name: "macOS".to_string(),
        os_version,
        cpu_model,
        gpu_model,
        ram_gb,
        chip_architecture: Some(if arch == "aarch64" { "arm64".to_string() } else { arch }),
    }
}

/// Returns the first `model name` entry from `/proc/cpuinfo` content.
fn parse_cpu_model(cpuinfo: &str) -> Option<String> {
    cpuinfo
        .lines()
        .filter(|l| l.starts_with("model name") || l.starts_with("Model"))
        .find_map(|l| l.split_once(':').map(|(_, v)| v.trim().to_string()))
        .filter(|s| !s.is_empty())
}

/// Parses `MemTotal:` (kB) from `/proc/meminfo` content.
fn parse_mem_total_kb(meminfo: &str) -> Option<u64> {
    meminfo.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("MemTotal:") => parts.next()?.parse().ok(),
            _ => None,
        }
    })
}

fn kb_to_gb(kb: u64) -> f64 {
    round1(kb as f64 / (1024.0 * 1024.0))
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn classify_cpu(cpu_model: Option<&str>) -> DeviceType {
    match cpu_model.map(str::to_lowercase) {
        Some(m) if m.contains("intel") => DeviceType::Intel,
        Some(m) if m.contains("amd") => DeviceType::Amd,
        _ => DeviceType::Unknown,
    }
}

/// `"Intel(R) Core(TM) i7-9700K CPU @ 3.60GHz"` → `"Intel(R) Core(TM) i7-9700K CPU"`.
fn short_cpu_name(cpu: &str) -> &str {
    cpu.split('@').next().unwrap_or(cpu).trim()
}
