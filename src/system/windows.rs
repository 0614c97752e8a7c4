//! Windows monitor: Win32 system counters.
//!
//! Sources:
//!   - usage: `GetSystemTimes` FILETIME counters (kernel time includes idle
//!     and is split out before the shared delta computation)
//!   - clock: nominal `~MHz` registry value; Windows exposes no public
//!     per-core live frequency, so the core map stays empty and only the
//!     logical core count is reported
//!   - memory: `GlobalMemoryStatusEx` plus `GetPerformanceInfo` commit
//!     charge as the swap approximation
//!   - census: one Toolhelp snapshot covering processes and threads
//!
//! Temperature is not available through public Win32 and reports the
//! sentinel.

use std::collections::HashMap;
use std::mem;

use tracing::debug;
use windows::core::w;
use windows::Win32::Foundation::{CloseHandle, FILETIME};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, Thread32First, Thread32Next,
    PROCESSENTRY32W, TH32CS_SNAPPROCESS, TH32CS_SNAPTHREAD, THREADENTRY32,
};
use windows::Win32::System::ProcessStatus::{GetPerformanceInfo, PERFORMANCE_INFORMATION};
use windows::Win32::System::Registry::{
    RegGetValueW, HKEY_LOCAL_MACHINE, RRF_RT_REG_DWORD,
};
use windows::Win32::System::SystemInformation::{GlobalMemoryStatusEx, MEMORYSTATUSEX};

use super::cpu::{CoreFrequencyReport, CpuSnapshot, TEMPERATURE_UNAVAILABLE};
use super::hardware_concurrency;
use super::memory::MemorySnapshot;
use super::process::ProcessCensus;
use super::rate::{CpuTicks, UsageTracker};
use super::SystemMonitor;

pub struct WindowsMonitor {
    usage: UsageTracker,
}

impl WindowsMonitor {
    pub fn new() -> Self {
        Self {
            usage: UsageTracker::new(),
        }
    }
}

impl SystemMonitor for WindowsMonitor {
    fn cpu_stats(&mut self) -> CpuSnapshot {
        let usage_percent = self.usage.update(read_cpu_ticks());

        CpuSnapshot {
            usage_percent,
            clock_mhz: nominal_clock_mhz(),
            temperature_c: TEMPERATURE_UNAVAILABLE,
            cores: CoreFrequencyReport::core_count_only(hardware_concurrency()),
        }
    }

    fn mem_stats(&self) -> MemorySnapshot {
        read_mem_stats()
    }

    fn process_census(&self) -> ProcessCensus {
        read_process_census()
    }
}

/// Map the `GetSystemTimes` counters onto the shared tick model.
/// Kernel time includes idle time, so the busy kernel share is
/// `kernel - idle`; both terms are monotone so the difference is too.
fn read_cpu_ticks() -> CpuTicks {
    let (idle, kernel, user) = get_system_times();
    CpuTicks {
        user,
        nice: 0,
        system: kernel.saturating_sub(idle),
        idle,
    }
}

/// Raw `GetSystemTimes` call. Returns (idle, kernel, user) in 100ns units,
/// zeros on failure.
fn get_system_times() -> (u64, u64, u64) {
    unsafe {
        let mut idle_time = FILETIME::default();
        let mut kernel_time = FILETIME::default();
        let mut user_time = FILETIME::default();

        #[link(name = "kernel32")]
        extern "system" {
            fn GetSystemTimes(
                lpIdleTime: *mut FILETIME,
                lpKernelTime: *mut FILETIME,
                lpUserTime: *mut FILETIME,
            ) -> i32;
        }

        if GetSystemTimes(&mut idle_time, &mut kernel_time, &mut user_time) == 0 {
            debug!("GetSystemTimes failed");
            return (0, 0, 0);
        }

        (
            filetime_to_u64(&idle_time),
            filetime_to_u64(&kernel_time),
            filetime_to_u64(&user_time),
        )
    }
}

/// Convert FILETIME to u64 (100-nanosecond intervals)
fn filetime_to_u64(ft: &FILETIME) -> u64 {
    ((ft.dwHighDateTime as u64) << 32) | (ft.dwLowDateTime as u64)
}

/// Nominal CPU clock from the registry
/// (`HKLM\HARDWARE\DESCRIPTION\System\CentralProcessor\0`, `~MHz`).
/// Live per-core clocks would need vendor APIs; nominal is reported instead.
fn nominal_clock_mhz() -> f64 {
    let mut mhz: u32 = 0;
    let mut cb = mem::size_of::<u32>() as u32;
    let rc = unsafe {
        RegGetValueW(
            HKEY_LOCAL_MACHINE,
            w!("HARDWARE\\DESCRIPTION\\System\\CentralProcessor\\0"),
            w!("~MHz"),
            RRF_RT_REG_DWORD,
            None,
            Some(&mut mhz as *mut u32 as *mut _),
            Some(&mut cb),
        )
    };
    if rc.is_ok() {
        f64::from(mhz)
    } else {
        0.0
    }
}

fn read_mem_stats() -> MemorySnapshot {
    let mut total_phys = 0u64;
    let mut avail_phys = 0u64;
    unsafe {
        let mut msex = MEMORYSTATUSEX {
            dwLength: mem::size_of::<MEMORYSTATUSEX>() as u32,
            ..Default::default()
        };
        if GlobalMemoryStatusEx(&mut msex).is_ok() {
            total_phys = msex.ullTotalPhys;
            avail_phys = msex.ullAvailPhys;
        }
    }

    let mut commit_total = 0u64;
    let mut commit_limit = 0u64;
    unsafe {
        let cb = mem::size_of::<PERFORMANCE_INFORMATION>() as u32;
        let mut pi = PERFORMANCE_INFORMATION {
            cb,
            ..Default::default()
        };
        if GetPerformanceInfo(&mut pi, cb).is_ok() {
            let page_size = pi.PageSize as u64;
            commit_total = pi.CommitTotal as u64 * page_size;
            commit_limit = pi.CommitLimit as u64 * page_size;
        } else {
            debug!("GetPerformanceInfo failed; swap figures unavailable");
        }
    }

    MemorySnapshot::from_commit_charge(total_phys, avail_phys, commit_total, commit_limit)
}

/// Count processes and threads from a single Toolhelp snapshot. Threads are
/// grouped by owning pid first so the totals stay consistent with each
/// other within the one snapshot.
fn read_process_census() -> ProcessCensus {
    let mut census = ProcessCensus::default();

    unsafe {
        let snapshot = match CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS | TH32CS_SNAPTHREAD, 0)
        {
            Ok(h) => h,
            Err(err) => {
                debug!("CreateToolhelp32Snapshot failed: {err}");
                return census;
            }
        };

        let mut threads_by_pid: HashMap<u32, u64> = HashMap::new();
        let mut te: THREADENTRY32 = mem::zeroed();
        te.dwSize = mem::size_of::<THREADENTRY32>() as u32;
        if Thread32First(snapshot, &mut te).is_ok() {
            loop {
                *threads_by_pid.entry(te.th32OwnerProcessID).or_insert(0) += 1;

                let mut next: THREADENTRY32 = mem::zeroed();
                next.dwSize = mem::size_of::<THREADENTRY32>() as u32;
                if Thread32Next(snapshot, &mut next).is_err() {
                    break;
                }
                te = next;
            }
        }

        let mut pe: PROCESSENTRY32W = mem::zeroed();
        pe.dwSize = mem::size_of::<PROCESSENTRY32W>() as u32;
        if Process32FirstW(snapshot, &mut pe).is_ok() {
            loop {
                census.processes += 1;
                census.threads += threads_by_pid
                    .get(&pe.th32ProcessID)
                    .copied()
                    .unwrap_or(0);

                let mut next: PROCESSENTRY32W = mem::zeroed();
                next.dwSize = mem::size_of::<PROCESSENTRY32W>() as u32;
                if Process32NextW(snapshot, &mut next).is_err() {
                    break;
                }
                pe = next;
            }
        }

        let _ = CloseHandle(snapshot);
    }

    census
}
