//! Polling session
//!
//! Owns the single connection to a device and the current [`Snapshot`].
//! `poll` and `write` take `&mut self`, so a session can only have one
//! operation in flight; callers that share it across tasks wrap it in a
//! mutex and skip ticks while a poll is outstanding.
//!
//! State machine:
//!
//! ```text
//!                 connect ok
//!  DISCONNECTED ─────────────▶ CONNECTED
//!       ▲                          │
//!       └──────────────────────────┘
//!         any connect/poll/write failure
//! ```
//!
//! There is no reconnect loop: every `poll`, `write` or `run_state` call
//! reconnects first when the session is disconnected.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::address::Address;
use crate::bytes::format_hex;
use crate::codec;
use crate::error::{BlockError, Result, TransportError};
use crate::registry::BlockRegistry;
use crate::snapshot::{BlockData, Snapshot};
use crate::transport::{BlockTransport, RunState};
use crate::value::BlockValue;

/// Connection state of a polling session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "DISCONNECTED"),
            ConnectionState::Connected => write!(f, "CONNECTED"),
        }
    }
}

/// Periodically refreshed view of a device's registered blocks
pub struct PollingSession {
    host: String,
    registry: Arc<BlockRegistry>,
    transport: Box<dyn BlockTransport>,
    state: ConnectionState,
    snapshot: Arc<Snapshot>,
}

impl std::fmt::Debug for PollingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingSession")
            .field("host", &self.host)
            .field("transport", &self.transport.name())
            .field("state", &self.state)
            .field("blocks", &self.snapshot.block_ids())
            .finish()
    }
}

impl PollingSession {
    pub fn new(
        host: impl Into<String>,
        registry: Arc<BlockRegistry>,
        transport: Box<dyn BlockTransport>,
    ) -> Self {
        Self {
            host: host.into(),
            registry,
            transport,
            state: ConnectionState::Disconnected,
            snapshot: Arc::new(Snapshot::empty()),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Shared registry this session fetches from
    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    /// Current snapshot (possibly stale, check `is_connected()` on it)
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Connect if not already connected
    pub async fn connect(&mut self) -> Result<()> {
        if self.state.is_connected() && self.transport.is_connected() {
            return Ok(());
        }

        debug!("Connecting to {} via {}", self.host, self.transport.name());
        match self.transport.connect(&self.host).await {
            Ok(()) => {
                self.set_state(ConnectionState::Connected, "connect succeeded");
                Ok(())
            },
            Err(e) => {
                warn!("Connection to {} failed: {}", self.host, e);
                self.mark_disconnected(&e).await;
                Err(e.into())
            },
        }
    }

    /// Refresh every registered block
    ///
    /// A failure on any block aborts the tick: the session becomes
    /// disconnected and the previous block data is kept unchanged.
    pub async fn poll(&mut self) -> Result<Arc<Snapshot>> {
        self.connect().await?;

        let registrations = self.registry.list_registered();
        let mut blocks = self.snapshot.blocks().clone();

        for reg in &registrations {
            match self
                .transport
                .read_block(reg.block_id, reg.start_offset, reg.length)
                .await
            {
                Ok(bytes) => {
                    if bytes.len() != reg.length as usize {
                        debug!(
                            "DB{} returned {} bytes, expected {}",
                            reg.block_id,
                            bytes.len(),
                            reg.length
                        );
                    }
                    tracing::trace!("DB{} [{}]", reg.block_id, format_hex(&bytes));
                    blocks.insert(
                        reg.block_id,
                        BlockData {
                            start_offset: reg.start_offset,
                            bytes,
                            fetched_at: Utc::now(),
                        },
                    );
                },
                Err(e) => {
                    warn!("Poll aborted at DB{}: {}", reg.block_id, e);
                    self.mark_disconnected(&e).await;
                    return Err(e.into());
                },
            }
        }

        debug!("Polled {} block(s) from {}", registrations.len(), self.host);
        let snapshot = Arc::new(Snapshot::from_blocks(blocks, Utc::now()));
        self.snapshot = Arc::clone(&snapshot);
        Ok(snapshot)
    }

    /// Decode a value from the current snapshot
    pub fn read(&self, address: &Address) -> Result<BlockValue> {
        self.snapshot.read(address)
    }

    /// Decode with display rounding (REAL only)
    pub fn read_rounded(&self, address: &Address, round_to: Option<u32>) -> Result<BlockValue> {
        self.snapshot.read_rounded(address, round_to)
    }

    /// Encode and write one value; no retry
    pub async fn write(&mut self, address: &Address, value: &BlockValue) -> Result<()> {
        let bytes = codec::encode(address, value)?;
        self.connect().await?;

        match self
            .transport
            .write_block(address.block_id(), address.byte_offset(), &bytes)
            .await
        {
            Ok(()) => {
                info!("Wrote {} = {} [{}]", address, value, format_hex(&bytes));
                Ok(())
            },
            Err(e) => {
                warn!("Write {} = {} failed: {}", address, value, e);
                self.mark_disconnected(&e).await;
                Err(e.into())
            },
        }
    }

    /// CPU operating mode
    pub async fn run_state(&mut self) -> Result<RunState> {
        self.connect().await?;

        match self.transport.run_state().await {
            Ok(run_state) => Ok(run_state),
            Err(e) => {
                warn!("Run state query failed: {}", e);
                self.mark_disconnected(&e).await;
                Err(e.into())
            },
        }
    }

    /// Close the connection; the snapshot stays readable but stale
    pub async fn disconnect(&mut self) -> Result<()> {
        let result = self.transport.disconnect().await;
        self.set_state(ConnectionState::Disconnected, "closed by caller");
        self.mark_snapshot_stale();
        result.map_err(BlockError::from)
    }

    async fn mark_disconnected(&mut self, cause: &TransportError) {
        if let Err(e) = self.transport.disconnect().await {
            debug!("Ignoring disconnect error after failure: {}", e);
        }
        self.set_state(ConnectionState::Disconnected, &cause.to_string());
        self.mark_snapshot_stale();
    }

    fn mark_snapshot_stale(&mut self) {
        if self.snapshot.is_connected() {
            self.snapshot = Arc::new(self.snapshot.disconnected());
        }
    }

    fn set_state(&mut self, new_state: ConnectionState, reason: &str) {
        if self.state != new_state {
            info!("[STATUS] {} -> {} - {}", self.state, new_state, reason);
            self.state = new_state;
        }
    }
}
