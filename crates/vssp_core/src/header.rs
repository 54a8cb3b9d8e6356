//! VSSP v1.0 fragment header.
//!
//! Layout (little-endian):
//!
//! | offset | field            | width |
//! |--------|------------------|-------|
//! | 0      | magic `"VSSP"`   | 4     |
//! | 4      | frame_id         | u32   |
//! | 8      | mode             | u8    |
//! | 9      | eye              | u8    |
//! | 10     | codec            | u8    |
//! | 11     | flags            | u8    |
//! | 12     | fragment_index   | u16   |
//! | 14     | fragment_count   | u16   |
//! | 16     | payload_size     | u16   |
//! | 18     | timestamp_ms     | u32   |
//! | 22     | reserved (zero)  | 2     |
//!
//! The payload starts at [`HEADER_LEN`] and runs `payload_size` bytes.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::ProtocolError;
use crate::frame::FrameKey;

/// Marker identifying the 24-byte v1.0 layout.
pub const MAGIC: [u8; 4] = *b"VSSP";

/// Header length including the two reserved alignment bytes.
pub const HEADER_LEN: usize = 24;

/// `flags` bit set by senders on the final fragment of a frame.
pub const FLAG_LAST_FRAGMENT: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FragmentHeader {
    pub frame_id: u32,
    pub mode: u8,
    pub eye: u8,
    pub codec: u8,
    pub flags: u8,
    pub fragment_index: u16,
    pub fragment_count: u16,
    pub payload_size: u16,
    pub timestamp_ms: u32,
}

impl FragmentHeader {
    /// Parse a datagram into its header and payload slice.
    ///
    /// Bytes past `payload_size` are ignored.
    pub fn parse(datagram: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        if datagram.len() < HEADER_LEN {
            return Err(ProtocolError::Truncated {
                expected: HEADER_LEN,
                actual: datagram.len(),
            });
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&datagram[0..4]);
        if magic != MAGIC {
            return Err(ProtocolError::ForeignMagic(magic));
        }

        let header = Self {
            frame_id: LittleEndian::read_u32(&datagram[4..8]),
            mode: datagram[8],
            eye: datagram[9],
            codec: datagram[10],
            flags: datagram[11],
            fragment_index: LittleEndian::read_u16(&datagram[12..14]),
            fragment_count: LittleEndian::read_u16(&datagram[14..16]),
            payload_size: LittleEndian::read_u16(&datagram[16..18]),
            timestamp_ms: LittleEndian::read_u32(&datagram[18..22]),
        };

        let available = datagram.len() - HEADER_LEN;
        let declared = header.payload_size as usize;
        if declared > available {
            return Err(ProtocolError::PayloadOverrun {
                declared,
                available,
            });
        }

        Ok((header, &datagram[HEADER_LEN..HEADER_LEN + declared]))
    }

    pub fn key(&self) -> FrameKey {
        FrameKey::new(self.frame_id, self.eye)
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&MAGIC);
        LittleEndian::write_u32(&mut out[4..8], self.frame_id);
        out[8] = self.mode;
        out[9] = self.eye;
        out[10] = self.codec;
        out[11] = self.flags;
        LittleEndian::write_u16(&mut out[12..14], self.fragment_index);
        LittleEndian::write_u16(&mut out[14..16], self.fragment_count);
        LittleEndian::write_u16(&mut out[16..18], self.payload_size);
        LittleEndian::write_u32(&mut out[18..22], self.timestamp_ms);
        out
    }

    /// Build a complete datagram: this header followed by `payload`.
    ///
    /// `payload_size` is written as given, so tests can produce inconsistent
    /// datagrams on purpose.
    pub fn encode_with(&self, payload: &[u8]) -> Vec<u8> {
        let mut datagram = Vec::with_capacity(HEADER_LEN + payload.len());
        datagram.extend_from_slice(&self.to_bytes());
        datagram.extend_from_slice(payload);
        datagram
    }
}
