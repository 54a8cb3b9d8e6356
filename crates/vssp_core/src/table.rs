//! Frame assembly table.
//!
//! Holds at most one [`FrameBuffer`] per [`FrameKey`]. Fragments may arrive in
//! any order, more than once, or not at all; the table stores each index once,
//! asks the [`CompletionPolicy`] after every stored fragment and hands back the
//! assembled frame the first time the policy is satisfied.
//!
//! Memory is bounded two ways: [`AssemblyTable::sweep`] purges buffers idle
//! past the staleness window, and creating a buffer in a full table evicts the
//! least recently updated one first.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::AssemblyConfig;
use crate::error::PolicyError;
use crate::frame::{AssembledFrame, FrameBuffer, FrameKey, FrameState, StoreResult};
use crate::header::FragmentHeader;
use crate::policy::CompletionPolicy;
use crate::stats::TableStats;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Stored,
    DuplicateIgnored,
    IndexOutOfRange,
    /// The frame was already shipped; the fragment changes nothing.
    AlreadyFinished,
    /// This fragment satisfied the completion policy. Returned once per key.
    Completed(AssembledFrame),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Incomplete buffers dropped (frames lost).
    pub discarded: usize,
    /// Completed markers released.
    pub released: usize,
}

pub struct AssemblyTable {
    buffers: HashMap<FrameKey, FrameBuffer>,
    policy: CompletionPolicy,
    max_buffers: usize,
    stats: TableStats,
}

impl AssemblyTable {
    pub fn new(policy: CompletionPolicy, max_buffers: usize) -> Self {
        let max_buffers = max_buffers.max(1);
        Self {
            buffers: HashMap::with_capacity(max_buffers),
            policy,
            max_buffers,
            stats: TableStats::default(),
        }
    }

    pub fn from_config(config: &AssemblyConfig) -> Result<Self, PolicyError> {
        Ok(Self::new(config.policy()?, config.max_buffers))
    }

    /// Offer one parsed fragment to the table.
    pub fn insert(
        &mut self,
        header: &FragmentHeader,
        payload: &[u8],
        now: Instant,
    ) -> InsertOutcome {
        // Reject before a buffer gets shaped by a nonsensical header.
        if header.fragment_index >= header.fragment_count {
            self.stats.out_of_range += 1;
            return InsertOutcome::IndexOutOfRange;
        }

        let key = header.key();
        if !self.buffers.contains_key(&key) {
            self.make_room();
        }
        let buffer = self
            .buffers
            .entry(key)
            .or_insert_with(|| FrameBuffer::new(header, now));

        match buffer.store(header, payload, now) {
            StoreResult::Finished => {
                self.stats.after_finish += 1;
                InsertOutcome::AlreadyFinished
            }
            StoreResult::OutOfRange => {
                self.stats.out_of_range += 1;
                InsertOutcome::IndexOutOfRange
            }
            StoreResult::Duplicate => {
                self.stats.duplicates += 1;
                InsertOutcome::DuplicateIgnored
            }
            StoreResult::Stored => {
                self.stats.fragments_stored += 1;
                if !self
                    .policy
                    .is_ready(buffer.received_count(), buffer.fragment_count())
                {
                    return InsertOutcome::Stored;
                }
                let frame = buffer.complete(key);
                self.stats.frames_completed += 1;
                if frame.is_partial() {
                    self.stats.frames_partial += 1;
                }
                InsertOutcome::Completed(frame)
            }
        }
    }

    /// Remove every buffer whose last accepted fragment is older than `max_age`,
    /// whatever its state.
    pub fn sweep(&mut self, now: Instant, max_age: Duration) -> SweepReport {
        let mut report = SweepReport::default();
        self.buffers.retain(|_, buffer| {
            if now.saturating_duration_since(buffer.last_update()) <= max_age {
                return true;
            }
            if buffer.state() == FrameState::Completed {
                report.released += 1;
            } else {
                buffer.discard();
                report.discarded += 1;
            }
            false
        });
        self.stats.evicted_stale += report.discarded as u64;
        report
    }

    fn make_room(&mut self) {
        while self.buffers.len() >= self.max_buffers {
            let Some(oldest) = self
                .buffers
                .iter()
                .min_by_key(|(_, buffer)| buffer.last_update())
                .map(|(key, _)| *key)
            else {
                return;
            };
            if let Some(mut evicted) = self.buffers.remove(&oldest) {
                // Only incomplete frames count as lost.
                if evicted.state() != FrameState::Completed {
                    evicted.discard();
                    self.stats.evicted_capacity += 1;
                }
            }
        }
    }

    pub fn get(&self, key: &FrameKey) -> Option<&FrameBuffer> {
        self.buffers.get(key)
    }

    pub fn contains(&self, key: &FrameKey) -> bool {
        self.buffers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Buffers still waiting for fragments.
    pub fn assembling(&self) -> usize {
        self.buffers
            .values()
            .filter(|buffer| buffer.state() == FrameState::Assembling)
            .count()
    }

    pub fn policy(&self) -> CompletionPolicy {
        self.policy
    }

    pub fn max_buffers(&self) -> usize {
        self.max_buffers
    }

    pub fn stats(&self) -> TableStats {
        self.stats
    }
}
