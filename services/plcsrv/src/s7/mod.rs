//! Siemens S7 transport
//!
//! - `frame`: telegram builders and validators (pure)
//! - `client`: tokio TCP client implementing `blocklink::BlockTransport`

pub mod client;
pub mod frame;

pub use client::{S7Client, S7Options};
