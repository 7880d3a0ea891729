//! scandesk engine
//!
//! The resource-arbitration and session-lifecycle core: the scanner
//! registry with its per-device state machine and selection policy, the
//! session store, and the reaper that expires abandoned sessions.
//!
//! Everything network- and chat-specific lives in the `bot` crate behind
//! the [`CaptureClient`] and [`DocumentAssembler`] traits defined here, so
//! the invariants in this crate are testable without a scanner on the LAN.

pub mod scan;
pub mod session;

pub use scan::capture::{CaptureClient, capture_pages};
pub use scan::registry::{DeviceLease, DeviceRegistry};
pub use session::reaper::spawn_reaper;
pub use session::store::{
    DocumentAssembler, ExpiredSession, FinalizedScan, SessionSnapshot, SessionStore,
};
