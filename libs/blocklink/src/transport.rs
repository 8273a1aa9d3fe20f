//! Transport Interface
//!
//! The polling session talks to a device only through [`BlockTransport`].
//! Any error returned here is a connection failure from the session's point
//! of view.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │        PollingSession        │
//! └──────────────────────────────┘
//!                │
//!                ▼
//! ┌──────────────────────────────┐
//! │   BlockTransport (trait)     │
//! │ connect / read / write / run │
//! └──────────────────────────────┘
//!          │              │
//!          ▼              ▼
//!    ┌──────────┐   ┌──────────┐
//!    │ S7 (TCP) │   │   Mock   │
//!    └──────────┘   └──────────┘
//! ```

pub mod mock;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TransportError;

/// Result type for transport operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// CPU operating mode reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunState {
    Run,
    Stop,
    #[default]
    Unknown,
}

impl RunState {
    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Run)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Run => write!(f, "Run"),
            RunState::Stop => write!(f, "Stop"),
            RunState::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Block-level access to a device
#[async_trait]
pub trait BlockTransport: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Open a connection to `host`, replacing any existing one
    async fn connect(&mut self, host: &str) -> TransportResult<()>;

    /// Whether the underlying link is believed to be up
    fn is_connected(&self) -> bool;

    /// Fetch `length` bytes of block `block_id` starting at `start`
    async fn read_block(&mut self, block_id: u16, start: u32, length: u32) -> TransportResult<Bytes>;

    /// Write `data` into block `block_id` at `start`
    async fn write_block(&mut self, block_id: u16, start: u32, data: &[u8]) -> TransportResult<()>;

    /// Query the CPU operating mode
    async fn run_state(&mut self) -> TransportResult<RunState>;

    /// Close the connection
    async fn disconnect(&mut self) -> TransportResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_state_display() {
        assert_eq!(RunState::Run.to_string(), "Run");
        assert_eq!(RunState::Stop.to_string(), "Stop");
        assert_eq!(RunState::default(), RunState::Unknown);
        assert!(!RunState::Unknown.is_running());
    }
}
