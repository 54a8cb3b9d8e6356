use serde::{Deserialize, Serialize};

/// Running counters kept by the assembly table. Every dropped fragment lands
/// in exactly one of these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub fragments_stored: u64,
    pub duplicates: u64,
    pub out_of_range: u64,
    /// Fragments that arrived for a frame that was already shipped.
    pub after_finish: u64,
    pub frames_completed: u64,
    /// Completed frames with at least one zero-length filler slot.
    pub frames_partial: u64,
    /// Incomplete frames purged by the age sweep.
    pub evicted_stale: u64,
    /// Buffers evicted to stay under the capacity ceiling.
    pub evicted_capacity: u64,
}

impl TableStats {
    /// Fragments that reached the table but were not stored.
    pub fn fragments_dropped(&self) -> u64 {
        self.duplicates + self.out_of_range + self.after_finish
    }
}
