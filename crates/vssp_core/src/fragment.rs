//! Sender-side fragmentation into VSSP datagrams.
//! Splits a frame into payloads of at most `max_payload` bytes, each behind a
//! full fragment header.

use crate::error::FragmentError;
use crate::header::{FragmentHeader, FLAG_LAST_FRAGMENT};

/// Payload bytes per fragment used by the headset streamer.
pub const MAX_PAYLOAD: usize = 1200;

/// Per-frame header fields shared by every fragment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub frame_id: u32,
    pub mode: u8,
    pub eye: u8,
    pub codec: u8,
    pub flags: u8,
    pub timestamp_ms: u32,
}

pub struct Fragmenter {
    max_payload: usize,
}

impl Default for Fragmenter {
    fn default() -> Self {
        Self {
            max_payload: MAX_PAYLOAD,
        }
    }
}

impl Fragmenter {
    pub fn new(max_payload: usize) -> Result<Self, FragmentError> {
        let max = u16::MAX as usize;
        if max_payload == 0 || max_payload > max {
            return Err(FragmentError::InvalidPayloadSize {
                requested: max_payload,
                max,
            });
        }
        Ok(Self { max_payload })
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Split `frame` into ready-to-send datagrams, in index order.
    ///
    /// An empty frame still yields one fragment with an empty payload so the
    /// relay ships it.
    pub fn split(
        &self,
        frame: &[u8],
        descriptor: &FrameDescriptor,
    ) -> Result<Vec<Vec<u8>>, FragmentError> {
        let needed = frame.len().div_ceil(self.max_payload).max(1);
        if needed > u16::MAX as usize {
            return Err(FragmentError::TooManyFragments {
                len: frame.len(),
                needed,
            });
        }

        let last = needed - 1;
        let mut header = FragmentHeader {
            frame_id: descriptor.frame_id,
            mode: descriptor.mode,
            eye: descriptor.eye,
            codec: descriptor.codec,
            flags: descriptor.flags | FLAG_LAST_FRAGMENT,
            fragment_index: 0,
            fragment_count: needed as u16,
            payload_size: 0,
            timestamp_ms: descriptor.timestamp_ms,
        };

        if frame.is_empty() {
            return Ok(vec![header.encode_with(&[])]);
        }

        let datagrams = frame
            .chunks(self.max_payload)
            .enumerate()
            .map(|(index, chunk)| {
                header.fragment_index = index as u16;
                header.flags = if index == last {
                    descriptor.flags | FLAG_LAST_FRAGMENT
                } else {
                    descriptor.flags
                };
                header.payload_size = chunk.len() as u16;
                header.encode_with(chunk)
            })
            .collect();
        Ok(datagrams)
    }
}
