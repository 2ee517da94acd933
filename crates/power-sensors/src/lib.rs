// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # power-sensors
//!
//! Platform-specific adapters that read instantaneous power draw from
//! the hardware, behind one [`PowerSensor`] capability.
//!
//! # Adapters
//! - **Apple**: `powermetrics` combined CPU + GPU + ANE power (macOS).
//! - **NVIDIA**: GPU board power via `nvidia-smi` (Linux).
//! - **AMD**: GPU package power via `rocm-smi` (Linux).
//! - **RAPL**: CPU package energy counters from
//!   `/sys/class/powercap` (Linux), differenced into watts.
//!
//! # Graceful Degradation
//! [`PowerSensor::is_available`] never fails: a missing tool, driver,
//! or unreadable counter is simply `false`. Reads that fail mid-session
//! return a [`SensorError`], which the caller is expected to treat as a
//! skipped sample.
//!
//! # Example
//! ```no_run
//! use power_sensors::{PowerSensor, RaplSensor};
//!
//! let mut rapl = RaplSensor::new();
//! if rapl.is_available() {
//!     rapl.read_power_watts().ok(); // primes the counter
//!     std::thread::sleep(std::time::Duration::from_millis(100));
//!     println!("{:.1} W", rapl.read_power_watts().unwrap_or(0.0));
//! }
//! ```

mod apple;
mod device;
mod error;
mod nvidia;
mod platform;
mod rapl;
mod rocm;
mod sensor;

pub use apple::ApplePowermetricsSensor;
pub use device::{DeviceInfo, DeviceType};
pub use error::SensorError;
pub use nvidia::{GpuSelection, NvidiaSensor};
pub use platform::Platform;
pub use rapl::RaplSensor;
pub use rocm::RocmSensor;
pub use sensor::{PowerSensor, SensorKind};
