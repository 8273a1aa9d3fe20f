//! Decoded block values

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value read from or written to a block
///
/// Integer primitives (WORD, DWORD, INT, DINT) all widen losslessly into
/// `Integer`; REAL widens into `Float`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
}

impl BlockValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            BlockValue::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            },
            BlockValue::Integer(i) => *i as f64,
            BlockValue::Float(f) => *f,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            BlockValue::Bool(b) => Some(i64::from(*b)),
            BlockValue::Integer(i) => Some(*i),
            BlockValue::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
            BlockValue::Float(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            BlockValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Parse a command-line style literal: `true`/`false`, an integer, or a float
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        match text.to_ascii_lowercase().as_str() {
            "true" | "on" => return Some(BlockValue::Bool(true)),
            "false" | "off" => return Some(BlockValue::Bool(false)),
            _ => {},
        }
        if let Ok(i) = text.parse::<i64>() {
            return Some(BlockValue::Integer(i));
        }
        text.parse::<f64>().ok().map(BlockValue::Float)
    }
}

impl fmt::Display for BlockValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockValue::Bool(b) => write!(f, "{}", b),
            BlockValue::Integer(i) => write!(f, "{}", i),
            BlockValue::Float(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for BlockValue {
    fn from(v: bool) -> Self {
        BlockValue::Bool(v)
    }
}

impl From<i64> for BlockValue {
    fn from(v: i64) -> Self {
        BlockValue::Integer(v)
    }
}

impl From<i32> for BlockValue {
    fn from(v: i32) -> Self {
        BlockValue::Integer(v as i64)
    }
}

impl From<u16> for BlockValue {
    fn from(v: u16) -> Self {
        BlockValue::Integer(v as i64)
    }
}

impl From<f64> for BlockValue {
    fn from(v: f64) -> Self {
        BlockValue::Float(v)
    }
}

impl From<f32> for BlockValue {
    fn from(v: f32) -> Self {
        BlockValue::Float(v as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literals() {
        assert_eq!(BlockValue::parse("2"), Some(BlockValue::Integer(2)));
        assert_eq!(BlockValue::parse("-7"), Some(BlockValue::Integer(-7)));
        assert_eq!(BlockValue::parse("12.5"), Some(BlockValue::Float(12.5)));
        assert_eq!(BlockValue::parse("TRUE"), Some(BlockValue::Bool(true)));
        assert_eq!(BlockValue::parse("off"), Some(BlockValue::Bool(false)));
        assert_eq!(BlockValue::parse("two"), None);
    }

    #[test]
    fn test_conversions() {
        assert_eq!(BlockValue::Float(3.0).as_i64(), Some(3));
        assert_eq!(BlockValue::Float(3.5).as_i64(), None);
        assert_eq!(BlockValue::Bool(true).as_f64(), 1.0);
        assert_eq!(BlockValue::Integer(5).as_bool(), None);
    }

    #[test]
    fn test_untagged_serde() {
        let v: BlockValue = serde_json::from_str("1").unwrap_or(BlockValue::Bool(false));
        assert_eq!(v, BlockValue::Integer(1));
        let v: BlockValue = serde_json::from_str("21.5").unwrap_or(BlockValue::Bool(false));
        assert_eq!(v, BlockValue::Float(21.5));
        let v: BlockValue = serde_json::from_str("true").unwrap_or(BlockValue::Integer(0));
        assert_eq!(v, BlockValue::Bool(true));
    }
}
