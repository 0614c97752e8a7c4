//! macOS monitor: Mach host statistics, sysctl, and libproc.
//!
//! Sources:
//!   - usage: `host_statistics(HOST_CPU_LOAD_INFO)` tick counters
//!   - per-core clocks: Apple Silicon only, via the privileged
//!     `powermetrics` sampler under a hard timeout; Intel Macs report a
//!     nominal sysctl frequency instead
//!   - memory: `HW_MEMSIZE` total, `host_statistics64(HOST_VM_INFO64)` page
//!     counts, `vm.swapusage` swap figures
//!   - census: `proc_listallpids` + `proc_pidinfo(PROC_PIDTASKALLINFO)`
//!
//! Temperature needs SMC access and is reported as unavailable.

use std::mem;
use std::process::Command;
use std::ptr;
use std::time::Duration;

use tracing::debug;

use super::cpu::{CoreFrequencyReport, CpuSnapshot, TEMPERATURE_UNAVAILABLE};
use super::hardware_concurrency;
use super::memory::MemorySnapshot;
use super::process::ProcessCensus;
use super::rate::{CpuTicks, UsageTracker};
use super::sampler::{capture_with_timeout, parse_core_frequency_lines};
use super::SystemMonitor;

/// Wall-clock bound on one `powermetrics` invocation.
const SAMPLER_TIMEOUT: Duration = Duration::from_secs(6);

const HOST_CPU_LOAD_INFO: libc::c_int = 3;
const HOST_VM_INFO64: libc::c_int = 4;

// cpu_ticks indices, per <mach/machine.h>
const CPU_STATE_USER: usize = 0;
const CPU_STATE_SYSTEM: usize = 1;
const CPU_STATE_IDLE: usize = 2;
const CPU_STATE_NICE: usize = 3;
const CPU_STATE_MAX: usize = 4;

#[repr(C)]
struct HostCpuLoadInfo {
    cpu_ticks: [libc::natural_t; CPU_STATE_MAX],
}

extern "C" {
    fn host_statistics(
        host: libc::mach_port_t,
        flavor: libc::c_int,
        host_info: *mut libc::integer_t,
        count: *mut libc::mach_msg_type_number_t,
    ) -> libc::kern_return_t;

    fn host_statistics64(
        host: libc::mach_port_t,
        flavor: libc::c_int,
        host_info: *mut libc::integer_t,
        count: *mut libc::mach_msg_type_number_t,
    ) -> libc::kern_return_t;

    fn host_page_size(
        host: libc::mach_port_t,
        page_size: *mut libc::vm_size_t,
    ) -> libc::kern_return_t;
}

pub struct MacMonitor {
    usage: UsageTracker,
}

impl MacMonitor {
    pub fn new() -> Self {
        Self {
            usage: UsageTracker::new(),
        }
    }
}

impl SystemMonitor for MacMonitor {
    fn cpu_stats(&mut self) -> CpuSnapshot {
        let usage_percent = self.usage.update(read_cpu_ticks());

        // Only Apple Silicon exposes per-core clocks, and only through the
        // powermetrics sampler (requires root).
        let cores = if cfg!(target_arch = "aarch64") {
            sample_per_core_frequencies()
        } else {
            CoreFrequencyReport::default()
        };

        let (clock_mhz, cores) = if cores.per_core_mhz.is_empty() {
            (
                nominal_clock_mhz(),
                CoreFrequencyReport::core_count_only(hardware_concurrency()),
            )
        } else {
            (cores.average_mhz, cores)
        };

        CpuSnapshot {
            usage_percent,
            clock_mhz,
            temperature_c: TEMPERATURE_UNAVAILABLE,
            cores,
        }
    }

    fn mem_stats(&self) -> MemorySnapshot {
        read_mem_stats()
    }

    fn process_census(&self) -> ProcessCensus {
        read_process_census()
    }
}

/// Aggregate tick counters across all cores. Unreadable statistics map to
/// zeros, which the tracker turns into a 0% reading.
fn read_cpu_ticks() -> CpuTicks {
    let mut info = HostCpuLoadInfo {
        cpu_ticks: [0; CPU_STATE_MAX],
    };
    let mut count =
        (mem::size_of::<HostCpuLoadInfo>() / mem::size_of::<libc::integer_t>()) as u32;

    let kr = unsafe {
        host_statistics(
            libc::mach_host_self(),
            HOST_CPU_LOAD_INFO,
            &mut info as *mut HostCpuLoadInfo as *mut libc::integer_t,
            &mut count,
        )
    };
    if kr != libc::KERN_SUCCESS {
        debug!("host_statistics(HOST_CPU_LOAD_INFO) failed: {kr}");
        return CpuTicks::default();
    }

    CpuTicks {
        user: u64::from(info.cpu_ticks[CPU_STATE_USER]),
        nice: u64::from(info.cpu_ticks[CPU_STATE_NICE]),
        system: u64::from(info.cpu_ticks[CPU_STATE_SYSTEM]),
        idle: u64::from(info.cpu_ticks[CPU_STATE_IDLE]),
    }
}

/// Run `powermetrics` once and parse its per-core frequency lines. Any
/// failure (timeout, non-zero exit, unparseable output) yields an empty
/// report and the caller falls back to the nominal clock.
fn sample_per_core_frequencies() -> CoreFrequencyReport {
    let mut cmd = Command::new("/usr/bin/powermetrics");
    cmd.args(["--samplers", "cpu_power", "-n", "1"]);

    match capture_with_timeout(&mut cmd, SAMPLER_TIMEOUT) {
        Ok(output) => CoreFrequencyReport::from_readings(parse_core_frequency_lines(&output)),
        Err(err) => {
            debug!("powermetrics unavailable: {err}");
            CoreFrequencyReport::default()
        }
    }
}

/// Nominal CPU frequency in MHz from sysctl, trying the fields that are
/// populated on different generations. Apple Silicon exposes none of them
/// and gets 0.
fn nominal_clock_mhz() -> f64 {
    for name in [
        "hw.cpufrequency_max\0",
        "hw.cpufrequency\0",
        "machdep.tsc.frequency\0",
    ] {
        if let Some(hz) = sysctl_u64_by_name(name) {
            if hz > 0 {
                return hz as f64 / 1_000_000.0;
            }
        }
    }
    0.0
}

/// `sysctlbyname` for a u64 value. `name` must be NUL-terminated.
fn sysctl_u64_by_name(name: &str) -> Option<u64> {
    debug_assert!(name.ends_with('\0'));
    let mut value: u64 = 0;
    let mut len = mem::size_of::<u64>();
    let rc = unsafe {
        libc::sysctlbyname(
            name.as_ptr() as *const libc::c_char,
            &mut value as *mut u64 as *mut libc::c_void,
            &mut len,
            ptr::null_mut(),
            0,
        )
    };
    if rc == 0 && len == mem::size_of::<u64>() {
        Some(value)
    } else {
        None
    }
}

fn read_mem_stats() -> MemorySnapshot {
    let mut snap = MemorySnapshot::default();

    // Physical RAM
    let mut mib = [libc::CTL_HW, libc::HW_MEMSIZE];
    let mut total: u64 = 0;
    let mut len = mem::size_of::<u64>();
    let rc = unsafe {
        libc::sysctl(
            mib.as_mut_ptr(),
            mib.len() as u32,
            &mut total as *mut u64 as *mut libc::c_void,
            &mut len,
            ptr::null_mut(),
            0,
        )
    };
    if rc == 0 {
        snap.total_bytes = total;
    }

    // Used/free from virtual-memory page counts: there is no single
    // "used RAM" field, so it is derived as active + inactive + wired pages.
    let mut page_size: libc::vm_size_t = 0;
    let mut vm: libc::vm_statistics64 = unsafe { mem::zeroed() };
    let mut count =
        (mem::size_of::<libc::vm_statistics64>() / mem::size_of::<libc::integer_t>()) as u32;
    let kr = unsafe {
        let host = libc::mach_host_self();
        if host_page_size(host, &mut page_size) != libc::KERN_SUCCESS {
            page_size = 4096;
        }
        host_statistics64(
            host,
            HOST_VM_INFO64,
            &mut vm as *mut libc::vm_statistics64 as *mut libc::integer_t,
            &mut count,
        )
    };
    if kr == libc::KERN_SUCCESS {
        let page = page_size as u64;
        snap.free_bytes = u64::from(vm.free_count) * page;
        snap.used_bytes =
            (u64::from(vm.active_count) + u64::from(vm.inactive_count) + u64::from(vm.wire_count))
                * page;
    } else {
        debug!("host_statistics64(HOST_VM_INFO64) failed: {kr}");
    }

    // Swap
    let mut swap: libc::xsw_usage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::xsw_usage>();
    let rc = unsafe {
        libc::sysctlbyname(
            "vm.swapusage\0".as_ptr() as *const libc::c_char,
            &mut swap as *mut libc::xsw_usage as *mut libc::c_void,
            &mut len,
            ptr::null_mut(),
            0,
        )
    };
    if rc == 0 {
        snap.swap_total_bytes = swap.xsu_total;
        snap.swap_used_bytes = swap.xsu_used;
    }

    snap
}

/// Enumerate all pids and sum their thread counts. Pids whose task info
/// cannot be read (exited, restricted) are skipped and count toward
/// neither total.
fn read_process_census() -> ProcessCensus {
    let mut census = ProcessCensus::default();

    let bytes_needed = unsafe { libc::proc_listallpids(ptr::null_mut(), 0) };
    if bytes_needed <= 0 {
        return census;
    }

    // Headroom for processes spawned between the two calls.
    let capacity = bytes_needed as usize / mem::size_of::<libc::pid_t>() + 64;
    let mut pids = vec![0 as libc::pid_t; capacity];
    let bytes_filled = unsafe {
        libc::proc_listallpids(
            pids.as_mut_ptr() as *mut libc::c_void,
            (capacity * mem::size_of::<libc::pid_t>()) as libc::c_int,
        )
    };
    if bytes_filled <= 0 {
        return census;
    }
    let filled = bytes_filled as usize / mem::size_of::<libc::pid_t>();

    for &pid in &pids[..filled.min(capacity)] {
        if pid <= 0 {
            continue;
        }
        let mut info: libc::proc_taskallinfo = unsafe { mem::zeroed() };
        let size = mem::size_of::<libc::proc_taskallinfo>() as libc::c_int;
        let read = unsafe {
            libc::proc_pidinfo(
                pid,
                libc::PROC_PIDTASKALLINFO,
                0,
                &mut info as *mut libc::proc_taskallinfo as *mut libc::c_void,
                size,
            )
        };
        if read == size {
            census.processes += 1;
            census.threads += info.ptinfo.pti_threadnum.max(0) as u64;
        }
    }

    census
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_poll_reports_zero_usage() {
        let mut monitor = MacMonitor::new();
        assert_eq!(monitor.cpu_stats().usage_percent, 0.0);
        let second = monitor.cpu_stats().usage_percent;
        assert!((0.0..=100.0).contains(&second));
    }

    #[test]
    fn memory_totals_are_plausible() {
        let snap = read_mem_stats();
        assert!(snap.total_bytes > 0);
        assert!(snap.used_bytes <= snap.total_bytes);
    }

    #[test]
    fn census_sees_this_process() {
        let census = read_process_census();
        assert!(census.processes > 0);
        assert!(census.threads >= u64::from(census.processes));
    }
}
