//! Normalized memory model. Each platform reconciles its own counters into
//! this shape; the commit-charge reconciliation used on Windows lives here
//! as a pure function so it stays testable everywhere.

/// RAM and swap usage in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemorySnapshot {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub swap_used_bytes: u64,
    pub swap_total_bytes: u64,
}

impl MemorySnapshot {
    /// Memory usage as a percentage.
    pub fn mem_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            (self.used_bytes as f64 / self.total_bytes as f64) * 100.0
        }
    }

    /// Swap usage as a percentage.
    pub fn swap_percent(&self) -> f64 {
        if self.swap_total_bytes == 0 {
            0.0
        } else {
            (self.swap_used_bytes as f64 / self.swap_total_bytes as f64) * 100.0
        }
    }

    /// Reconcile Windows-style counters into the normalized model.
    ///
    /// Windows has no literal "swap used" figure; the closest public metric
    /// is the commit charge. `swap_used` here is the commit total in excess
    /// of physical RAM, floored at zero — an approximation of pagefile
    /// pressure, not an exact swap number. `swap_total` is the commit limit.
    pub fn from_commit_charge(
        total_phys: u64,
        avail_phys: u64,
        commit_total: u64,
        commit_limit: u64,
    ) -> Self {
        Self {
            total_bytes: total_phys,
            used_bytes: total_phys.saturating_sub(avail_phys),
            free_bytes: avail_phys,
            swap_used_bytes: commit_total.saturating_sub(total_phys),
            swap_total_bytes: commit_limit,
        }
    }
}

/// Format bytes to a short human-readable string (KiB, MiB, GiB).
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    const GIB: u64 = 1024 * MIB;
    const TIB: u64 = 1024 * GIB;

    if bytes >= TIB {
        format!("{:.1}T", bytes as f64 / TIB as f64)
    } else if bytes >= GIB {
        format!("{:.1}G", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.0}M", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.0}K", bytes as f64 / KIB as f64)
    } else {
        format!("{}B", bytes)
    }
}
