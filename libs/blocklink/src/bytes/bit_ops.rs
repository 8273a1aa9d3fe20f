//! Bit-level operations for block data
//!
//! Bit 0 is the least significant bit of a byte, matching the `DBX n.b`
//! notation used by S7 data blocks.

/// Extract single bit from u8 value
#[inline]
pub fn extract_bit_u8(value: u8, bit_index: u8) -> bool {
    debug_assert!(bit_index < 8, "Bit index out of range: {}", bit_index);
    (value & (1 << bit_index)) != 0
}

/// Read one bit of the byte at `byte_index`, `None` if the byte is missing
#[inline]
pub fn get_bit(bytes: &[u8], byte_index: usize, bit_index: u8) -> Option<bool> {
    bytes
        .get(byte_index)
        .map(|byte| extract_bit_u8(*byte, bit_index))
}
