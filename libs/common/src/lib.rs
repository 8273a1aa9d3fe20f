//! Shared service plumbing
//!
//! Provides the pieces every service binary needs:
//! - logging initialization
//! - configuration loading (file + environment)
//! - shutdown signal handling

pub mod config_loader;
pub mod logging;
pub mod shutdown;

pub use config_loader::load_config;
pub use logging::{init_with_config, LogConfig};
pub use shutdown::{wait_for_shutdown, ShutdownSignal};
