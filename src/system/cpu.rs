//! CPU snapshot types shared by every platform monitor.

use std::collections::BTreeMap;

/// Sentinel reported when no CPU temperature sensor is readable.
pub const TEMPERATURE_UNAVAILABLE: f64 = -1.0;

/// Per-core clock frequencies from one discovery pass.
#[derive(Debug, Clone, Default)]
pub struct CoreFrequencyReport {
    /// Number of cores with a frequency reading, or a hardware-concurrency
    /// count when no frequency source was readable.
    pub total_cores: usize,
    /// Arithmetic mean of `per_core_mhz`, 0 when the map is empty.
    pub average_mhz: f64,
    /// Logical core id -> current clock in MHz.
    pub per_core_mhz: BTreeMap<usize, f64>,
}

impl CoreFrequencyReport {
    /// Build a report from raw `(core id, MHz)` readings.
    ///
    /// Readings that are zero, negative, or non-finite are discarded as
    /// invalid. A core id seen twice keeps the last reading.
    pub fn from_readings<I>(readings: I) -> Self
    where
        I: IntoIterator<Item = (usize, f64)>,
    {
        let mut per_core_mhz = BTreeMap::new();
        for (id, mhz) in readings {
            if mhz.is_finite() && mhz > 0.0 {
                per_core_mhz.insert(id, mhz);
            }
        }

        let total_cores = per_core_mhz.len();
        let average_mhz = if total_cores > 0 {
            per_core_mhz.values().sum::<f64>() / total_cores as f64
        } else {
            0.0
        };

        Self {
            total_cores,
            average_mhz,
            per_core_mhz,
        }
    }

    /// Last-resort report: core count only, no frequency data.
    pub fn core_count_only(total_cores: usize) -> Self {
        Self {
            total_cores,
            ..Self::default()
        }
    }
}

/// Aggregate CPU telemetry for one poll.
#[derive(Debug, Clone, Default)]
pub struct CpuSnapshot {
    /// Overall usage since the previous poll, 0..=100. Exactly 0 on the
    /// first poll of a fresh monitor (no baseline yet).
    pub usage_percent: f64,
    /// Average core clock when per-core data exists, else a nominal
    /// single-CPU reading, else 0.
    pub clock_mhz: f64,
    /// °C, or [`TEMPERATURE_UNAVAILABLE`].
    pub temperature_c: f64,
    pub cores: CoreFrequencyReport,
}
