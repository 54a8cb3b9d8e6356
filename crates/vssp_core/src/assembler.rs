//! Ordered concatenation of fragment payloads.
//!
//! A slot that never received its fragment (only possible under threshold
//! completion) contributes zero bytes. Later fragments keep their relative
//! order; their absolute offsets shift exactly as if the missing fragment had
//! been sent with an empty payload. Payload content is never inspected.

/// Concatenate `slots` in index order, using an empty filler for missing slots.
pub fn assemble(slots: &[Option<Vec<u8>>]) -> Vec<u8> {
    let total: usize = slots.iter().flatten().map(Vec::len).sum();
    let mut frame = Vec::with_capacity(total);
    for payload in slots.iter().flatten() {
        frame.extend_from_slice(payload);
    }
    frame
}

/// Indices of the slots that hold no payload.
pub fn missing_indices(slots: &[Option<Vec<u8>>]) -> Vec<u16> {
    slots
        .iter()
        .enumerate()
        .filter(|(_, slot)| slot.is_none())
        .map(|(index, _)| index as u16)
        .collect()
}
