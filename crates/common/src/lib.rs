//! Common utilities for scandesk
//!
//! Shared plumbing between the engine and the bot daemon: error types,
//! logging setup, and the async channel bridge that carries discovery
//! events from the mDNS delivery thread into the tokio runtime.

pub mod channel;
pub mod error;
pub mod logging;

pub use channel::{DiscoveryBridge, DiscoveryEvent, DiscoveryWorker, create_discovery_bridge};
pub use error::{Error, Result};
pub use logging::setup_logging;
