//! Block addresses
//!
//! An [`Address`] is a pure coordinate inside a data block: block id, byte
//! offset, optional bit index and primitive type. It carries no buffer and is
//! `Copy`, so it can be shared freely between consumers.
//!
//! Addresses use the S7 notation in text form:
//!
//! | Text             | Type  |
//! |------------------|-------|
//! | `DB250.DBX14.0`  | BOOL  |
//! | `DB10.DBW16`     | WORD  |
//! | `DB32.DBD20`     | DWORD |
//! | `DB10.INT16`     | INT   |
//! | `DB32.DINT20`    | DINT  |
//! | `DB40.REAL30`    | REAL  |

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::{BlockError, Result};

/// Fixed-width value encodings supported inside a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrimitiveType {
    /// Single bit of a byte
    Bool,
    /// 16-bit unsigned
    Word,
    /// 32-bit unsigned
    DWord,
    /// 16-bit signed
    Int,
    /// 32-bit signed
    DInt,
    /// 32-bit IEEE-754 float
    Real,
}

impl PrimitiveType {
    /// Number of bytes occupied in the block (a BOOL reads one byte)
    pub fn byte_len(&self) -> usize {
        match self {
            Self::Bool => 1,
            Self::Word | Self::Int => 2,
            Self::DWord | Self::DInt | Self::Real => 4,
        }
    }

    /// Parse from type name (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "BOOL" | "X" | "DBX" => Some(Self::Bool),
            "WORD" | "DBW" => Some(Self::Word),
            "DWORD" | "DBD" => Some(Self::DWord),
            "INT" => Some(Self::Int),
            "DINT" => Some(Self::DInt),
            "REAL" => Some(Self::Real),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "BOOL",
            Self::Word => "WORD",
            Self::DWord => "DWORD",
            Self::Int => "INT",
            Self::DInt => "DINT",
            Self::Real => "REAL",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Word | Self::DWord | Self::Int | Self::DInt)
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location of one value inside a data block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    block_id: u16,
    byte_offset: u32,
    bit_index: Option<u8>,
    primitive_type: PrimitiveType,
}

impl Address {
    /// Create an address, enforcing that a bit index is present iff the type is BOOL
    pub fn new(
        block_id: u16,
        byte_offset: u32,
        bit_index: Option<u8>,
        primitive_type: PrimitiveType,
    ) -> Result<Self> {
        match (primitive_type, bit_index) {
            (PrimitiveType::Bool, Some(bit)) if bit <= 7 => {},
            (PrimitiveType::Bool, Some(bit)) => {
                return Err(BlockError::invalid_address(format!(
                    "bit index {} not in [0,7]",
                    bit
                )))
            },
            (PrimitiveType::Bool, None) => {
                return Err(BlockError::invalid_address("BOOL requires a bit index"))
            },
            (other, Some(_)) => {
                return Err(BlockError::invalid_address(format!(
                    "{} does not take a bit index",
                    other
                )))
            },
            (_, None) => {},
        }

        Ok(Self {
            block_id,
            byte_offset,
            bit_index,
            primitive_type,
        })
    }

    /// `DB{block}.DBX{byte}.{bit}`
    pub fn bool(block_id: u16, byte_offset: u32, bit_index: u8) -> Result<Self> {
        Self::new(block_id, byte_offset, Some(bit_index), PrimitiveType::Bool)
    }

    /// `DB{block}.DBW{byte}`
    pub fn word(block_id: u16, byte_offset: u32) -> Self {
        Self::numeric(block_id, byte_offset, PrimitiveType::Word)
    }

    /// `DB{block}.DBD{byte}`
    pub fn dword(block_id: u16, byte_offset: u32) -> Self {
        Self::numeric(block_id, byte_offset, PrimitiveType::DWord)
    }

    /// `DB{block}.INT{byte}`
    pub fn int(block_id: u16, byte_offset: u32) -> Self {
        Self::numeric(block_id, byte_offset, PrimitiveType::Int)
    }

    /// `DB{block}.DINT{byte}`
    pub fn dint(block_id: u16, byte_offset: u32) -> Self {
        Self::numeric(block_id, byte_offset, PrimitiveType::DInt)
    }

    /// `DB{block}.REAL{byte}`
    pub fn real(block_id: u16, byte_offset: u32) -> Self {
        Self::numeric(block_id, byte_offset, PrimitiveType::Real)
    }

    fn numeric(block_id: u16, byte_offset: u32, primitive_type: PrimitiveType) -> Self {
        debug_assert!(primitive_type != PrimitiveType::Bool);
        Self {
            block_id,
            byte_offset,
            bit_index: None,
            primitive_type,
        }
    }

    pub fn block_id(&self) -> u16 {
        self.block_id
    }

    pub fn byte_offset(&self) -> u32 {
        self.byte_offset
    }

    pub fn bit_index(&self) -> Option<u8> {
        self.bit_index
    }

    pub fn primitive_type(&self) -> PrimitiveType {
        self.primitive_type
    }

    /// Bytes covered by this address within its block
    pub fn byte_len(&self) -> usize {
        self.primitive_type.byte_len()
    }

    /// First byte past the value (`byte_offset + byte_len`)
    pub fn end_offset(&self) -> u64 {
        self.byte_offset as u64 + self.byte_len() as u64
    }

    /// Same type and bit at another byte offset
    pub fn with_offset(&self, byte_offset: u32) -> Self {
        Self {
            byte_offset,
            ..*self
        }
    }

    /// Same location, different bit (BOOL only)
    pub fn with_bit(&self, bit_index: u8) -> Result<Self> {
        Self::new(
            self.block_id,
            self.byte_offset,
            Some(bit_index),
            self.primitive_type,
        )
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (db, off) = (self.block_id, self.byte_offset);
        match (self.primitive_type, self.bit_index) {
            (PrimitiveType::Bool, Some(bit)) => write!(f, "DB{}.DBX{}.{}", db, off, bit),
            (PrimitiveType::Bool, None) => write!(f, "DB{}.DBX{}", db, off),
            (PrimitiveType::Word, _) => write!(f, "DB{}.DBW{}", db, off),
            (PrimitiveType::DWord, _) => write!(f, "DB{}.DBD{}", db, off),
            (other, _) => write!(f, "DB{}.{}{}", db, other, off),
        }
    }
}

fn address_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"(?i)^DB(\d+)\.(DBX|X|BOOL|DBW|DBD|WORD|DWORD|DINT|INT|REAL)(\d+)(?:\.(\d+))?$",
            )
            .ok()
        })
        .as_ref()
}

impl FromStr for Address {
    type Err = BlockError;

    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim();
        let pattern = address_pattern()
            .ok_or_else(|| BlockError::invalid_address("address pattern unavailable"))?;
        let caps = pattern
            .captures(text)
            .ok_or_else(|| BlockError::invalid_address(format!("unrecognised address '{}'", s)))?;

        let block_id: u16 = caps[1]
            .parse()
            .map_err(|_| BlockError::invalid_address(format!("block number in '{}'", s)))?;
        let primitive_type = PrimitiveType::parse(&caps[2])
            .ok_or_else(|| BlockError::invalid_address(format!("type in '{}'", s)))?;
        let byte_offset: u32 = caps[3]
            .parse()
            .map_err(|_| BlockError::invalid_address(format!("byte offset in '{}'", s)))?;
        let bit_index = match caps.get(4) {
            Some(bit) => Some(
                bit.as_str()
                    .parse::<u8>()
                    .map_err(|_| BlockError::invalid_address(format!("bit index in '{}'", s)))?,
            ),
            None => None,
        };

        Self::new(block_id, byte_offset, bit_index, primitive_type)
    }
}

impl TryFrom<String> for Address {
    type Error = BlockError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_bit_index_invariant() {
        assert!(Address::bool(150, 14, 0).is_ok());
        assert!(Address::bool(150, 14, 7).is_ok());
        assert!(matches!(
            Address::bool(150, 14, 8),
            Err(BlockError::InvalidAddress(_))
        ));
        assert!(Address::new(10, 16, Some(0), PrimitiveType::Word).is_err());
        assert!(Address::new(10, 16, None, PrimitiveType::Bool).is_err());
        assert_eq!(Address::word(10, 16).bit_index(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Address::bool(250, 14, 0).unwrap().to_string(), "DB250.DBX14.0");
        assert_eq!(Address::word(10, 16).to_string(), "DB10.DBW16");
        assert_eq!(Address::dword(204, 20).to_string(), "DB204.DBD20");
        assert_eq!(Address::int(30, 12).to_string(), "DB30.INT12");
        assert_eq!(Address::dint(204, 24).to_string(), "DB204.DINT24");
        assert_eq!(Address::real(40, 30).to_string(), "DB40.REAL30");
    }

    #[test]
    fn test_parse_s7_notation() {
        let addr: Address = "DB250.DBX14.5".parse().unwrap();
        assert_eq!(addr, Address::bool(250, 14, 5).unwrap());

        let addr: Address = "db10.dbw16".parse().unwrap();
        assert_eq!(addr, Address::word(10, 16));

        let addr: Address = "DB32.DBD20".parse().unwrap();
        assert_eq!(addr.primitive_type(), PrimitiveType::DWord);

        let addr: Address = " DB40.REAL30 ".parse().unwrap();
        assert_eq!(addr, Address::real(40, 30));

        let addr: Address = "DB204.DINT24".parse().unwrap();
        assert_eq!(addr, Address::dint(204, 24));

        let addr: Address = "DB10.INT12".parse().unwrap();
        assert_eq!(addr, Address::int(10, 12));

        let addr: Address = "DB1.BOOL0.1".parse().unwrap();
        assert_eq!(addr, Address::bool(1, 0, 1).unwrap());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for text in [
            "",
            "DB40",
            "DB40.REAL",
            "DB40.DBX14",
            "DB40.DBX14.8",
            "DB40.DBW16.1",
            "DB70000.DBW0",
            "M10.0",
            "DB40.DBB3",
        ] {
            assert!(
                matches!(text.parse::<Address>(), Err(BlockError::InvalidAddress(_))),
                "expected '{}' to be rejected",
                text
            );
        }
    }

    #[test]
    fn test_display_parse_round_trip() {
        for addr in [
            Address::bool(250, 14, 3).unwrap(),
            Address::word(10, 16),
            Address::dword(1, 0),
            Address::int(2, 4),
            Address::dint(3, 8),
            Address::real(40, 30),
        ] {
            assert_eq!(addr.to_string().parse::<Address>().unwrap(), addr);
        }
    }

    #[test]
    fn test_serde_string_form() {
        let addr = Address::real(40, 30);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"DB40.REAL30\"");

        let back: Address = serde_json::from_str("\"DB250.DBX14.0\"").unwrap();
        assert_eq!(back, Address::bool(250, 14, 0).unwrap());

        assert!(serde_json::from_str::<Address>("\"DB250.DBX14\"").is_err());
    }

    #[test]
    fn test_widths() {
        assert_eq!(Address::bool(1, 0, 0).unwrap().byte_len(), 1);
        assert_eq!(Address::int(1, 0).byte_len(), 2);
        assert_eq!(Address::real(1, 50).end_offset(), 54);
    }
}
