//! Viewer-facing relay envelope: `size:u32 LE | mode:u8 | eye:u8 | codec:u8`
//! followed by `size` frame bytes. One envelope per completed frame.

use byteorder::{ByteOrder, LittleEndian};

use crate::frame::AssembledFrame;

pub const ENVELOPE_HEADER_LEN: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub size: u32,
    pub mode: u8,
    pub eye: u8,
    pub codec: u8,
}

impl EnvelopeHeader {
    /// Read the fixed prefix of an envelope. Returns `None` if fewer than
    /// [`ENVELOPE_HEADER_LEN`] bytes are given.
    pub fn parse(envelope: &[u8]) -> Option<Self> {
        if envelope.len() < ENVELOPE_HEADER_LEN {
            return None;
        }
        Some(Self {
            size: LittleEndian::read_u32(&envelope[0..4]),
            mode: envelope[4],
            eye: envelope[5],
            codec: envelope[6],
        })
    }
}

pub fn encode(frame: &AssembledFrame) -> Vec<u8> {
    encode_parts(&frame.bytes, frame.mode, frame.key.eye, frame.codec)
}

pub fn encode_parts(bytes: &[u8], mode: u8, eye: u8, codec: u8) -> Vec<u8> {
    let mut envelope = Vec::with_capacity(ENVELOPE_HEADER_LEN + bytes.len());
    // u16 fragments of at most u16::MAX bytes each always fit a u32 size.
    envelope.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    envelope.push(mode);
    envelope.push(eye);
    envelope.push(codec);
    envelope.extend_from_slice(bytes);
    envelope
}
