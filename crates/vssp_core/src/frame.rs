use serde::Serialize;
use std::fmt;
use std::time::Instant;

use crate::assembler;
use crate::header::FragmentHeader;

/// Identifies one independently assembled frame: the sender's frame counter
/// plus the eye/channel it was rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FrameKey {
    pub frame_id: u32,
    pub eye: u8,
}

impl FrameKey {
    pub fn new(frame_id: u32, eye: u8) -> Self {
        Self { frame_id, eye }
    }
}

impl fmt::Display for FrameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.frame_id, self.eye)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameState {
    Assembling,
    /// Shipped. The buffer stays in the table without payload so that late
    /// fragments for the same key are rejected instead of starting over.
    Completed,
    /// Evicted before completion.
    Discarded,
}

/// Result of offering one fragment to a [`FrameBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreResult {
    Stored,
    Duplicate,
    /// Index past the declared count, or a fragment count that disagrees with
    /// the one this buffer was created with.
    OutOfRange,
    /// The buffer is no longer assembling.
    Finished,
}

/// In-progress state of one frame.
#[derive(Debug)]
pub struct FrameBuffer {
    mode: u8,
    codec: u8,
    fragment_count: u16,
    slots: Vec<Option<Vec<u8>>>,
    received_mask: Vec<u64>,
    received_count: u16,
    last_update: Instant,
    state: FrameState,
}

impl FrameBuffer {
    /// Create an empty buffer shaped by the first fragment seen for its key.
    pub fn new(first: &FragmentHeader, now: Instant) -> Self {
        let count = first.fragment_count as usize;
        Self {
            mode: first.mode,
            codec: first.codec,
            fragment_count: first.fragment_count,
            slots: vec![None; count],
            received_mask: vec![0; count.div_ceil(64)],
            received_count: 0,
            last_update: now,
            state: FrameState::Assembling,
        }
    }

    pub fn store(&mut self, header: &FragmentHeader, payload: &[u8], now: Instant) -> StoreResult {
        if self.state != FrameState::Assembling {
            return StoreResult::Finished;
        }
        if header.fragment_count != self.fragment_count
            || header.fragment_index >= self.fragment_count
        {
            return StoreResult::OutOfRange;
        }

        let index = header.fragment_index as usize;
        let (word, bit) = (index / 64, 1u64 << (index % 64));
        if self.received_mask[word] & bit != 0 {
            return StoreResult::Duplicate;
        }

        self.received_mask[word] |= bit;
        self.slots[index] = Some(payload.to_vec());
        self.received_count += 1;
        self.last_update = now;
        StoreResult::Stored
    }

    /// Move the payloads out, assemble them and mark the buffer completed.
    pub(crate) fn complete(&mut self, key: FrameKey) -> AssembledFrame {
        let slots = std::mem::take(&mut self.slots);
        self.state = FrameState::Completed;
        AssembledFrame {
            key,
            mode: self.mode,
            codec: self.codec,
            fragment_count: self.fragment_count,
            missing: assembler::missing_indices(&slots),
            bytes: assembler::assemble(&slots),
        }
    }

    pub(crate) fn discard(&mut self) {
        self.slots = Vec::new();
        self.state = FrameState::Discarded;
    }

    pub fn is_received(&self, index: u16) -> bool {
        let index = index as usize;
        self.received_mask
            .get(index / 64)
            .is_some_and(|word| word & (1u64 << (index % 64)) != 0)
    }

    pub fn mode(&self) -> u8 {
        self.mode
    }

    pub fn codec(&self) -> u8 {
        self.codec
    }

    pub fn fragment_count(&self) -> u16 {
        self.fragment_count
    }

    pub fn received_count(&self) -> u16 {
        self.received_count
    }

    pub fn last_update(&self) -> Instant {
        self.last_update
    }

    pub fn state(&self) -> FrameState {
        self.state
    }
}

/// A frame ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledFrame {
    pub key: FrameKey,
    pub mode: u8,
    pub codec: u8,
    pub fragment_count: u16,
    /// Indices replaced by zero-length filler (threshold completion only).
    pub missing: Vec<u16>,
    pub bytes: Vec<u8>,
}

impl AssembledFrame {
    pub fn is_partial(&self) -> bool {
        !self.missing.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(index: u16, count: u16) -> FragmentHeader {
        FragmentHeader {
            frame_id: 1,
            fragment_index: index,
            fragment_count: count,
            ..Default::default()
        }
    }

    #[test]
    fn test_mask_spans_words() {
        let now = Instant::now();
        let mut buffer = FrameBuffer::new(&header(0, 130), now);
        for index in [0u16, 63, 64, 129] {
            assert_eq!(buffer.store(&header(index, 130), &[1], now), StoreResult::Stored);
        }
        assert!(buffer.is_received(63));
        assert!(buffer.is_received(64));
        assert!(!buffer.is_received(65));
        assert!(!buffer.is_received(500));
        assert_eq!(buffer.store(&header(129, 130), &[1], now), StoreResult::Duplicate);
        assert_eq!(buffer.received_count(), 4);
    }

    #[test]
    fn test_count_mismatch_is_out_of_range() {
        let now = Instant::now();
        let mut buffer = FrameBuffer::new(&header(0, 4), now);
        assert_eq!(buffer.store(&header(1, 5), &[1], now), StoreResult::OutOfRange);
        assert_eq!(buffer.store(&header(4, 4), &[1], now), StoreResult::OutOfRange);
        assert_eq!(buffer.received_count(), 0);
    }

    #[test]
    fn test_completed_rejects_fragments() {
        let now = Instant::now();
        let mut buffer = FrameBuffer::new(&header(0, 2), now);
        buffer.store(&header(0, 2), b"x", now);
        let frame = buffer.complete(FrameKey::new(1, 0));
        assert_eq!(frame.missing, vec![1]);
        assert_eq!(buffer.state(), FrameState::Completed);
        assert_eq!(buffer.store(&header(1, 2), b"y", now), StoreResult::Finished);
    }

    #[test]
    fn test_frame_key_display() {
        assert_eq!(FrameKey::new(42, 1).to_string(), "42/1");
    }
}
