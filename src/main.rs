//! vitals — a small cross-platform host telemetry sampler.
//!
//! Prints one snapshot every few seconds:
//!   - CPU usage % and average clock (per-core clocks when the OS exposes them)
//!   - CPU temperature (where a sensor is readable)
//!   - RAM and swap usage
//!   - Process and thread totals
//!
//! All sampling lives in the `system` module behind the `SystemMonitor`
//! capability; this file is only the timer loop and the renderer.

mod system;

use std::thread;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use system::cpu::TEMPERATURE_UNAVAILABLE;
use system::memory::format_bytes;
use system::{platform_monitor, SystemMonitor};

/// Sampling cadence in milliseconds
const TICK_RATE_MS: u64 = 3000;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut monitor = platform_monitor();
    let tick_rate = Duration::from_millis(TICK_RATE_MS);

    // The first CPU sample seeds the usage baseline and reports 0%.
    loop {
        let cpu = monitor.cpu_stats();
        let mem = monitor.mem_stats();
        let census = monitor.process_census();

        println!(
            "CPU {:5.1}% | avg {:.0} MHz | {} cores",
            cpu.usage_percent, cpu.cores.average_mhz, cpu.cores.total_cores
        );

        if !cpu.cores.per_core_mhz.is_empty() {
            let cores: Vec<String> = cpu
                .cores
                .per_core_mhz
                .iter()
                .map(|(id, mhz)| format!("{}: {:.0} MHz", id, mhz))
                .collect();
            println!("per-core: {}", cores.join(", "));
        }

        if cpu.temperature_c > TEMPERATURE_UNAVAILABLE {
            println!("temp: {:.1} °C", cpu.temperature_c);
        } else {
            println!("temp: n/a");
        }

        println!(
            "RAM  {} / {} | swap {} / {}",
            format_bytes(mem.used_bytes),
            format_bytes(mem.total_bytes),
            format_bytes(mem.swap_used_bytes),
            format_bytes(mem.swap_total_bytes),
        );
        println!(
            "tasks: {} processes, {} threads",
            census.processes, census.threads
        );
        println!("-----------------------------");

        thread::sleep(tick_rate);
    }
}
