//! Buffer codec
//!
//! Pure conversions between an [`Address`] plus a raw block buffer and a
//! typed [`BlockValue`]. All fields are fixed-width big-endian; there is no
//! I/O and no state.
//!
//! BOOL values are read-only: writes in this domain are whole command words,
//! so [`encode`] rejects BOOL addresses with `UnsupportedOperation`.

use crate::address::{Address, PrimitiveType};
use crate::bytes::{field, get_bit, round_to_decimals};
use crate::error::{BlockError, Result};
use crate::value::BlockValue;

/// Decode the value at `address` from a block buffer
pub fn decode(address: &Address, buffer: &[u8]) -> Result<BlockValue> {
    let offset = address.byte_offset();
    let at = offset as usize;
    let width = address.byte_len();
    let out_of_range = || BlockError::out_of_range(offset, width, buffer.len());

    let value = match address.primitive_type() {
        PrimitiveType::Bool => {
            let bit = address
                .bit_index()
                .ok_or_else(|| BlockError::invalid_address("BOOL requires a bit index"))?;
            BlockValue::Bool(get_bit(buffer, at, bit).ok_or_else(out_of_range)?)
        },
        PrimitiveType::Word => {
            let raw = field::<2>(buffer, at).ok_or_else(out_of_range)?;
            BlockValue::Integer(u16::from_be_bytes(raw) as i64)
        },
        PrimitiveType::Int => {
            let raw = field::<2>(buffer, at).ok_or_else(out_of_range)?;
            BlockValue::Integer(i16::from_be_bytes(raw) as i64)
        },
        PrimitiveType::DWord => {
            let raw = field::<4>(buffer, at).ok_or_else(out_of_range)?;
            BlockValue::Integer(u32::from_be_bytes(raw) as i64)
        },
        PrimitiveType::DInt => {
            let raw = field::<4>(buffer, at).ok_or_else(out_of_range)?;
            BlockValue::Integer(i32::from_be_bytes(raw) as i64)
        },
        PrimitiveType::Real => {
            let raw = field::<4>(buffer, at).ok_or_else(out_of_range)?;
            BlockValue::Float(f32::from_be_bytes(raw) as f64)
        },
    };

    Ok(value)
}

/// Decode with optional display rounding
///
/// `round_to` is a number of decimal places and only affects REAL values.
pub fn decode_rounded(
    address: &Address,
    buffer: &[u8],
    round_to: Option<u32>,
) -> Result<BlockValue> {
    let value = decode(address, buffer)?;
    Ok(match (value, round_to) {
        (BlockValue::Float(v), Some(decimals)) => {
            BlockValue::Float(round_to_decimals(v, decimals))
        },
        (other, _) => other,
    })
}

/// Encode `value` into the bytes to write at `address.byte_offset()`
pub fn encode(address: &Address, value: &BlockValue) -> Result<Vec<u8>> {
    let primitive = address.primitive_type();
    let out_of_domain = || BlockError::value_out_of_domain(primitive, value);

    match primitive {
        PrimitiveType::Bool => Err(BlockError::unsupported(format!(
            "BOOL writes are not supported ({})",
            address
        ))),
        PrimitiveType::Real => {
            let v = match value {
                BlockValue::Float(f) => *f,
                BlockValue::Integer(i) => *i as f64,
                BlockValue::Bool(_) => return Err(out_of_domain()),
            };
            if !v.is_finite() || v.abs() > f32::MAX as f64 {
                return Err(out_of_domain());
            }
            let narrowed = v as f32;
            // A nonzero value must not collapse to zero in single precision
            if narrowed == 0.0 && v != 0.0 {
                return Err(out_of_domain());
            }
            Ok(narrowed.to_be_bytes().to_vec())
        },
        _ => {
            let v = integer_operand(value).ok_or_else(out_of_domain)?;
            let bytes = match primitive {
                PrimitiveType::Word => u16::try_from(v)
                    .map_err(|_| out_of_domain())?
                    .to_be_bytes()
                    .to_vec(),
                PrimitiveType::Int => i16::try_from(v)
                    .map_err(|_| out_of_domain())?
                    .to_be_bytes()
                    .to_vec(),
                PrimitiveType::DWord => u32::try_from(v)
                    .map_err(|_| out_of_domain())?
                    .to_be_bytes()
                    .to_vec(),
                _ => i32::try_from(v)
                    .map_err(|_| out_of_domain())?
                    .to_be_bytes()
                    .to_vec(),
            };
            Ok(bytes)
        },
    }
}

/// Integer operand for WORD/INT/DWORD/DINT; whole floats are accepted, booleans are not
fn integer_operand(value: &BlockValue) -> Option<i64> {
    match value {
        BlockValue::Integer(i) => Some(*i),
        BlockValue::Float(f) if f.is_finite() && f.fract() == 0.0 => {
            if *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                Some(*f as i64)
            } else {
                None
            }
        },
        _ => None,
    }
}
