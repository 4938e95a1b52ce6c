//! Payload masking

/// XOR `data` with the rotating 4-byte `key`
///
/// `offset` is the position of `data[0]` within the whole payload, so a
/// payload masked piecewise across chunks lines up with the key exactly as
/// if it had been masked in one go. Masking is its own inverse.
pub fn apply_mask(data: &mut [u8], key: [u8; 4], offset: usize) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[(offset + i) % 4];
    }
}

/// Fresh random key for an outgoing masked frame
pub fn generate_mask_key() -> [u8; 4] {
    rand::random()
}
