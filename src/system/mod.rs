//! Platform-specific telemetry sampling behind one capability.
//!
//! Each supported OS gets one monitor type implementing [`SystemMonitor`];
//! the right one is picked once at compile time by [`platform_monitor`].
//! Monitors never fail a poll: metrics an OS cannot provide come back as
//! documented sentinels (`-1.0` temperature, `0` frequency, empty core map)
//! rather than errors.

pub mod cpu;
pub mod memory;
pub mod process;
pub mod rate;
pub mod sampler;

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "macos")]
pub mod macos;
#[cfg(windows)]
pub mod windows;

use self::cpu::CpuSnapshot;
use self::memory::MemorySnapshot;
use self::process::ProcessCensus;

/// Capability consumed by the sampling driver once per tick.
///
/// `cpu_stats` takes `&mut self`: the monitor owns the usage baseline and
/// mutates it exactly once per poll. One instance is meant to be polled
/// sequentially from a single driver; concurrent callers must each own an
/// independent instance (or serialize access), otherwise the usage deltas
/// get corrupted.
pub trait SystemMonitor {
    fn cpu_stats(&mut self) -> CpuSnapshot;
    fn mem_stats(&self) -> MemorySnapshot;
    fn process_census(&self) -> ProcessCensus;
}

/// Build the monitor for the current target OS.
pub fn platform_monitor() -> Box<dyn SystemMonitor> {
    #[cfg(target_os = "linux")]
    return Box::new(linux::LinuxMonitor::new());
    #[cfg(target_os = "macos")]
    return Box::new(macos::MacMonitor::new());
    #[cfg(windows)]
    return Box::new(windows::WindowsMonitor::new());
    #[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
    compile_error!("vitals has no monitor for this target OS");
}

/// Logical CPU count, used as the last-resort core-count fallback when no
/// frequency source is readable.
pub(crate) fn hardware_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
