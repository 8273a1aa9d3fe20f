//! PLC Polling Service (plcsrv)
//!
//! Polls the data blocks of one Siemens S7 CPU on a fixed tick and exposes
//! named points, command words and bounded setpoints on top of [`blocklink`].
//!
//! # Modules
//! - `s7`: ISO-on-TCP transport
//! - `config`: service configuration and validation
//! - `coordinator`: point table, refresh loop, commands and setpoints

pub mod config;
pub mod coordinator;
pub mod s7;

pub use config::PlcsrvConfig;
pub use coordinator::{CoordinatorData, PlcCoordinator, PointReading};
pub use s7::{S7Client, S7Options};

/// Build a coordinator talking S7 to the configured CPU
pub fn s7_coordinator(config: PlcsrvConfig) -> PlcCoordinator {
    let client = S7Client::new(config.plc.s7_options());
    PlcCoordinator::new(config, Box::new(client))
}
