//! Shared domain types for scandesk
//!
//! This crate defines the device and session identities, the fixed capture
//! settings, and the error taxonomy shared by the engine and the boundary
//! adapters. It is pure data: no I/O, no async, no shared state.

pub mod error;
pub mod types;

pub use error::{
    AcquireError, AssembleError, CaptureError, FinalizeError, ScanError, SelectError, SessionError,
};
pub use types::{DeviceInfo, DeviceKey, DeviceState, InputSource, OwnerKey, ScanSettings, SessionId};
