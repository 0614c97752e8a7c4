//! Linux monitor: procfs and sysfs counters.
//!
//! Sources:
//!   - usage: first line of `/proc/stat` (user/nice/system/idle ticks)
//!   - per-core clocks: `/sys/devices/system/cpu/cpu*/cpufreq/scaling_cur_freq`,
//!     falling back to the `cpu MHz` lines of `/proc/cpuinfo`
//!   - temperature: first readable `temp*_input` of a CPU-ish hwmon chip
//!   - memory: `/proc/meminfo`
//!   - census: `Threads:` line of each `/proc/<pid>/status`
//!
//! Readers take the root path as a parameter so tests can point them at a
//! fabricated tree.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use super::cpu::{CoreFrequencyReport, CpuSnapshot, TEMPERATURE_UNAVAILABLE};
use super::hardware_concurrency;
use super::memory::MemorySnapshot;
use super::process::ProcessCensus;
use super::rate::{CpuTicks, UsageTracker};
use super::SystemMonitor;

pub struct LinuxMonitor {
    usage: UsageTracker,
}

impl LinuxMonitor {
    pub fn new() -> Self {
        Self {
            usage: UsageTracker::new(),
        }
    }
}

impl SystemMonitor for LinuxMonitor {
    fn cpu_stats(&mut self) -> CpuSnapshot {
        let ticks = read_cpu_ticks(Path::new("/proc/stat")).unwrap_or_else(|| {
            warn!("could not read /proc/stat; reporting 0% usage");
            CpuTicks::default()
        });
        let usage_percent = self.usage.update(ticks);

        let cores = discover_core_frequencies(
            Path::new("/sys/devices/system/cpu"),
            Path::new("/proc/cpuinfo"),
        );

        CpuSnapshot {
            usage_percent,
            clock_mhz: cores.average_mhz,
            temperature_c: read_cpu_temperature(Path::new("/sys/class/hwmon")),
            cores,
        }
    }

    fn mem_stats(&self) -> MemorySnapshot {
        fs::read_to_string("/proc/meminfo")
            .map(|text| parse_meminfo(&text))
            .unwrap_or_default()
    }

    fn process_census(&self) -> ProcessCensus {
        census_from_proc(Path::new("/proc"))
    }
}

/// Read the aggregate cpu line of `/proc/stat`. Only the first four fields
/// matter for the usage ratio.
fn read_cpu_ticks(stat: &Path) -> Option<CpuTicks> {
    let text = fs::read_to_string(stat).ok()?;
    parse_cpu_ticks(&text)
}

fn parse_cpu_ticks(stat: &str) -> Option<CpuTicks> {
    let line = stat.lines().find(|l| l.starts_with("cpu "))?;
    let mut fields = line.split_whitespace().skip(1);
    let mut next = || fields.next()?.parse::<u64>().ok();
    Some(CpuTicks {
        user: next()?,
        nice: next()?,
        system: next()?,
        idle: next()?,
    })
}

/// Per-core clock discovery: sysfs cpufreq first, `/proc/cpuinfo` second,
/// bare core count last.
fn discover_core_frequencies(sys_cpu: &Path, cpuinfo: &Path) -> CoreFrequencyReport {
    let report = CoreFrequencyReport::from_readings(read_sysfs_frequencies(sys_cpu));
    if !report.per_core_mhz.is_empty() {
        return report;
    }

    debug!("no cpufreq data under {}; trying cpuinfo", sys_cpu.display());
    let fallback = fs::read_to_string(cpuinfo)
        .map(|text| CoreFrequencyReport::from_readings(parse_cpuinfo_frequencies(&text)))
        .unwrap_or_default();
    if !fallback.per_core_mhz.is_empty() {
        return fallback;
    }

    debug!("no frequency source readable; reporting core count only");
    CoreFrequencyReport::core_count_only(hardware_concurrency())
}

/// `(core id, MHz)` pairs from `cpu<N>/cpufreq/scaling_cur_freq` (kHz).
fn read_sysfs_frequencies(sys_cpu: &Path) -> Vec<(usize, f64)> {
    let entries = match fs::read_dir(sys_cpu) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut readings = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let core_id = match name
            .to_str()
            .and_then(|n| n.strip_prefix("cpu"))
            .and_then(|n| n.parse::<usize>().ok())
        {
            Some(id) => id,
            None => continue, // cpufreq, cpuidle, ...
        };

        let freq_file = entry.path().join("cpufreq/scaling_cur_freq");
        if let Ok(text) = fs::read_to_string(&freq_file) {
            if let Ok(khz) = text.trim().parse::<i64>() {
                if khz > 0 {
                    readings.push((core_id, khz as f64 / 1000.0));
                }
            }
        }
    }
    readings
}

/// `(core id, MHz)` pairs from the `cpu MHz` lines of `/proc/cpuinfo`,
/// one per logical CPU in listing order.
fn parse_cpuinfo_frequencies(cpuinfo: &str) -> Vec<(usize, f64)> {
    cpuinfo
        .lines()
        .filter(|line| line.starts_with("cpu MHz"))
        .filter_map(|line| line.split(':').nth(1))
        .filter_map(|value| value.trim().parse::<f64>().ok())
        .enumerate()
        .collect()
}

/// First readable temperature of a CPU-related hwmon chip, in °C.
/// Returns [`TEMPERATURE_UNAVAILABLE`] when no sensor matches.
fn read_cpu_temperature(hwmon_root: &Path) -> f64 {
    let entries = match fs::read_dir(hwmon_root) {
        Ok(entries) => entries,
        Err(_) => return TEMPERATURE_UNAVAILABLE,
    };

    for entry in entries.flatten() {
        let chip = entry.path();
        let name = match fs::read_to_string(chip.join("name")) {
            Ok(name) => name,
            Err(_) => continue,
        };
        let name = name.trim();
        if !(name.contains("coretemp") || name.contains("k10temp") || name.contains("cpu")) {
            continue;
        }

        // Chips expose several temp<N>_input files; take the first readable.
        for i in 1..10 {
            let input = chip.join(format!("temp{i}_input"));
            if let Ok(text) = fs::read_to_string(&input) {
                if let Ok(milli_c) = text.trim().parse::<i64>() {
                    return milli_c as f64 / 1000.0;
                }
            }
        }
    }
    TEMPERATURE_UNAVAILABLE
}

/// Reconcile `/proc/meminfo` (kB values) into the normalized model.
///
/// The kernel's MemFree undercounts what is actually reclaimable, so free
/// RAM is `MemFree + Buffers + Cached` and used is the remainder of
/// MemTotal. Swap used is `SwapTotal - SwapFree`.
fn parse_meminfo(meminfo: &str) -> MemorySnapshot {
    let mut total = 0u64;
    let mut mem_free = 0u64;
    let mut buffers = 0u64;
    let mut cached = 0u64;
    let mut swap_total = 0u64;
    let mut swap_free = 0u64;

    for line in meminfo.lines() {
        let mut parts = line.split_whitespace();
        let (key, value) = match (parts.next(), parts.next()) {
            (Some(key), Some(value)) => (key, value),
            _ => continue,
        };
        let bytes = match value.parse::<u64>() {
            Ok(kb) => kb * 1024,
            Err(_) => continue,
        };
        match key {
            "MemTotal:" => total = bytes,
            "MemFree:" => mem_free = bytes,
            "Buffers:" => buffers = bytes,
            "Cached:" => cached = bytes,
            "SwapTotal:" => swap_total = bytes,
            "SwapFree:" => swap_free = bytes,
            _ => {}
        }
    }

    let free = mem_free + buffers + cached;
    MemorySnapshot {
        total_bytes: total,
        used_bytes: total.saturating_sub(free),
        free_bytes: free,
        swap_used_bytes: swap_total.saturating_sub(swap_free),
        swap_total_bytes: swap_total,
    }
}

/// Walk the numeric directories of `proc_root`, summing `Threads:` counts.
/// Entries that vanish or cannot be parsed are skipped and count toward
/// neither total.
fn census_from_proc(proc_root: &Path) -> ProcessCensus {
    let mut census = ProcessCensus::default();
    let entries = match fs::read_dir(proc_root) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("could not enumerate {}: {err}", proc_root.display());
            return census;
        }
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let is_pid = name
            .to_str()
            .map(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
            .unwrap_or(false);
        if !is_pid {
            continue;
        }

        let status = match fs::read_to_string(entry.path().join("status")) {
            Ok(status) => status,
            Err(_) => continue, // exited mid-enumeration or access denied
        };
        if let Some(threads) = parse_status_threads(&status) {
            census.processes += 1;
            census.threads += threads;
        }
    }
    census
}

fn parse_status_threads(status: &str) -> Option<u64> {
    status
        .lines()
        .find(|line| line.starts_with("Threads:"))?
        .split_whitespace()
        .nth(1)?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn parses_proc_stat_cpu_line() {
        let stat = "cpu  100 0 50 850 12 0 3 0 0 0\ncpu0 50 0 25 425 6 0 1 0 0 0\n";
        let ticks = parse_cpu_ticks(stat).unwrap();
        assert_eq!(
            ticks,
            CpuTicks {
                user: 100,
                nice: 0,
                system: 50,
                idle: 850
            }
        );
        assert!(parse_cpu_ticks("intr 12345\n").is_none());
    }

    #[test]
    fn sysfs_frequencies_prefer_cpufreq() {
        let root = TempDir::new().unwrap();
        for (id, khz) in [(0, 1_200_000), (1, 1_300_000), (2, 1_250_000)] {
            let dir = root.path().join(format!("cpu{id}/cpufreq"));
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("scaling_cur_freq"), format!("{khz}\n")).unwrap();
        }
        // Non-core entries must be ignored.
        fs::create_dir_all(root.path().join("cpufreq")).unwrap();
        fs::create_dir_all(root.path().join("cpuidle")).unwrap();

        let report =
            discover_core_frequencies(root.path(), Path::new("/nonexistent/cpuinfo"));
        assert_eq!(report.total_cores, 3);
        assert!((report.average_mhz - 1250.0).abs() < 1e-9);
        assert_eq!(report.per_core_mhz.get(&1), Some(&1300.0));
    }

    #[test]
    fn cpuinfo_fallback_when_sysfs_empty() {
        let root = TempDir::new().unwrap();
        let cpuinfo = root.path().join("cpuinfo");
        fs::write(
            &cpuinfo,
            "processor\t: 0\ncpu MHz\t\t: 2200.000\nprocessor\t: 1\ncpu MHz\t\t: 2400.000\n",
        )
        .unwrap();

        let report = discover_core_frequencies(&root.path().join("no-sysfs"), &cpuinfo);
        assert_eq!(report.total_cores, 2);
        assert!((report.average_mhz - 2300.0).abs() < 1e-9);
    }

    #[test]
    fn core_count_fallback_when_nothing_readable() {
        let root = TempDir::new().unwrap();
        let report = discover_core_frequencies(
            &root.path().join("no-sysfs"),
            &root.path().join("no-cpuinfo"),
        );
        assert!(report.per_core_mhz.is_empty());
        assert_eq!(report.average_mhz, 0.0);
        assert!(report.total_cores >= 1);
    }

    #[test]
    fn hwmon_temperature_filters_cpu_chips() {
        let root = TempDir::new().unwrap();
        let fan = root.path().join("hwmon0");
        fs::create_dir_all(&fan).unwrap();
        fs::write(fan.join("name"), "nvme\n").unwrap();
        fs::write(fan.join("temp1_input"), "70000\n").unwrap();

        let cpu = root.path().join("hwmon1");
        fs::create_dir_all(&cpu).unwrap();
        fs::write(cpu.join("name"), "coretemp\n").unwrap();
        fs::write(cpu.join("temp1_input"), "54500\n").unwrap();

        let temp = read_cpu_temperature(root.path());
        assert!((temp - 54.5).abs() < 1e-9);
    }

    #[test]
    fn missing_hwmon_reports_sentinel() {
        let root = TempDir::new().unwrap();
        assert_eq!(
            read_cpu_temperature(&root.path().join("absent")),
            TEMPERATURE_UNAVAILABLE
        );
    }

    #[test]
    fn meminfo_reconciliation() {
        let meminfo = "\
MemTotal:       16000000 kB
MemFree:         2000000 kB
MemAvailable:    9000000 kB
Buffers:         1000000 kB
Cached:          5000000 kB
SwapTotal:       2000000 kB
SwapFree:         500000 kB
";
        let snap = parse_meminfo(meminfo);
        assert_eq!(snap.total_bytes, 16_000_000 * 1024);
        assert_eq!(snap.free_bytes, 8_000_000 * 1024);
        assert_eq!(snap.used_bytes, 8_000_000 * 1024);
        assert_eq!(snap.used_bytes + snap.free_bytes, snap.total_bytes);
        // swap used = SwapTotal - SwapFree
        assert_eq!(snap.swap_used_bytes, 1_500_000 * 1024);
        assert!(snap.swap_used_bytes <= snap.swap_total_bytes);
    }

    #[test]
    fn census_skips_uninspectable_processes() {
        let root = TempDir::new().unwrap();
        for (pid, threads) in [(101, 4u32), (202, 1u32)] {
            let dir = root.path().join(pid.to_string());
            fs::create_dir_all(&dir).unwrap();
            fs::write(
                dir.join("status"),
                format!("Name:\tfake\nPid:\t{pid}\nThreads:\t{threads}\n"),
            )
            .unwrap();
        }
        // Exited mid-enumeration: directory present, status already gone.
        fs::create_dir_all(root.path().join("303")).unwrap();
        // Non-PID entries must not be visited.
        fs::create_dir_all(root.path().join("sys")).unwrap();

        let census = census_from_proc(root.path());
        assert_eq!(census.processes, 2);
        assert_eq!(census.threads, 5);
        assert!(census.threads >= u64::from(census.processes));
    }

    #[test]
    fn first_poll_reports_zero_usage() {
        let mut monitor = LinuxMonitor::new();
        assert_eq!(monitor.cpu_stats().usage_percent, 0.0);
        let second = monitor.cpu_stats().usage_percent;
        assert!((0.0..=100.0).contains(&second));
    }
}
