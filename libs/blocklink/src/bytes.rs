//! Binary data processing utilities
//!
//! Fixed-width big-endian field access and bit manipulation over raw block
//! buffers. All helpers are bounds-checked and allocation-free.
//!
//! # Design Principles
//!
//! - **Protocol-agnostic**: No S7-specific logic
//! - **Checked**: Out-of-range access returns `None`, never panics
//! - **Zero-copy**: Direct byte array operations

pub mod bit_ops;
pub mod conversions;

pub use bit_ops::*;
pub use conversions::*;
