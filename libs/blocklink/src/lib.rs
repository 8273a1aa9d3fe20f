//! Block Link Library
//!
//! Typed access to fixed-layout PLC data blocks.
//!
//! # Architecture
//!
//! This library provides:
//! - **Address**: block/byte/bit coordinates with S7 notation (`DB40.REAL30`)
//! - **Codec**: pure big-endian decode/encode of BOOL, WORD, DWORD, INT, DINT, REAL
//! - **Registry**: shared, idempotent set of blocks to fetch
//! - **Session**: connection state machine refreshing registered blocks into snapshots
//! - **Transport**: the `BlockTransport` seam plus an in-memory mock

pub mod address;
pub mod bytes;
pub mod codec;
pub mod error;
pub mod registry;
pub mod session;
pub mod snapshot;
pub mod transport;
pub mod value;

// Re-export core types
pub use address::{Address, PrimitiveType};
pub use codec::{decode, decode_rounded, encode};
pub use error::{BlockError, Result, TransportError};
pub use registry::{BlockRegistration, BlockRegistry};
pub use session::{ConnectionState, PollingSession};
pub use snapshot::{BlockData, Snapshot};
pub use transport::{BlockTransport, RunState, TransportResult};
pub use value::BlockValue;
