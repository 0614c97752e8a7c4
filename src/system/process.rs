//! Process/thread census totals.

/// Point-in-time process and thread totals.
///
/// Inherently racy: processes may start or exit during enumeration, and
/// entries that cannot be inspected (exited mid-read, access denied) are
/// skipped silently — they count toward neither field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessCensus {
    pub processes: u32,
    pub threads: u64,
}
