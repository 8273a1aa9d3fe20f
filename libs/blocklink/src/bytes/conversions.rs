//! Fixed-width field extraction and numeric helpers
//!
//! Every multi-byte field inside a block is big-endian; callers take the
//! array returned by [`field`] and decode it with `from_be_bytes`.

/// Copy `N` bytes starting at `offset`, `None` if they do not all fit
///
/// # Examples
/// ```
/// use blocklink::bytes::field;
///
/// let data = [0x12, 0x34, 0x56];
/// assert_eq!(field::<2>(&data, 1), Some([0x34, 0x56]));
/// assert_eq!(field::<2>(&data, 2), None);
/// ```
#[inline]
pub fn field<const N: usize>(bytes: &[u8], offset: usize) -> Option<[u8; N]> {
    let end = offset.checked_add(N)?;
    bytes.get(offset..end)?.try_into().ok()
}

/// Round to a fixed number of decimal places (half away from zero)
///
/// Used for display-oriented analog readouts such as `12.300000190734863`
/// (an f32 widened to f64) which should surface as `12.3`.
pub fn round_to_decimals(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(decimals.min(15) as i32);
    let scaled = value * factor;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / factor
}

/// Format bytes as spaced upper-case hex (`"03 00 00 1F"`)
pub fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
