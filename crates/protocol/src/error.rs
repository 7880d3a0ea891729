//! Error taxonomy
//!
//! Every failure a request can hit maps to one of these kinds. All of them
//! are recoverable and reported to the owning conversation; none of them
//! may take down the request-handling loop. Only configuration problems
//! abort the process, and those use `anyhow` in the binary's startup path.

use thiserror::Error;

/// Selection failed: no scanner satisfied the request.
///
/// Pure-read failures from the selection policy, distinct from acquisition
/// failures: nothing was claimed, nothing changed state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectError {
    #[error("no idle scanner is available")]
    NoIdleDevices,

    #[error("no idle scanner named \"{0}\"")]
    NoMatchingDevice(String),
}

/// Acquisition failed: the chosen scanner was not idle at claim time.
///
/// Never retried automatically; the user re-issues the request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AcquireError {
    #[error("scanner \"{0}\" is busy")]
    DeviceBusy(String),

    #[error("scanner \"{0}\" is not reachable")]
    DeviceUnreachable(String),

    #[error("scanner \"{0}\" is not known")]
    UnknownDevice(String),
}

/// The external capture call failed. The scanner is still released to idle
/// by the caller's lease regardless of which variant this is.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("scan job was rejected: {0}")]
    JobCreate(String),

    #[error("page transfer failed: {0}")]
    PageTransfer(String),

    #[error("scanner protocol error: {0}")]
    Protocol(String),
}

/// Session-protocol misuse, reported as a user-facing message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("a scan session is already active for this user")]
    AlreadyActive,

    #[error("another scan session is in progress")]
    Busy,

    #[error("no active scan session")]
    NotFound,

    #[error("could not store the page: {0}")]
    Spool(String),
}

/// Document assembly failed. Non-destructive: the session and its page
/// files are left in place for a retry.
#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("session has no pages to assemble")]
    NoPages,

    #[error("page {0} could not be decoded: {1}")]
    BadPage(usize, String),

    #[error("I/O error during assembly: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of the combined select -> acquire -> capture request path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScanError {
    #[error(transparent)]
    Select(#[from] SelectError),

    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Failure of a finalize request.
#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("could not assemble the document: {0}")]
    Assemble(#[from] AssembleError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_device() {
        let err = AcquireError::DeviceBusy("Office".to_string());
        assert_eq!(err.to_string(), "scanner \"Office\" is busy");

        let err = SelectError::NoMatchingDevice("Office2".to_string());
        assert!(err.to_string().contains("Office2"));
    }

    #[test]
    fn test_scan_error_wraps_each_stage() {
        let select: ScanError = SelectError::NoIdleDevices.into();
        assert!(matches!(select, ScanError::Select(_)));

        let acquire: ScanError = AcquireError::DeviceBusy("x".into()).into();
        assert!(matches!(acquire, ScanError::Acquire(_)));

        let capture: ScanError = CaptureError::Protocol("x".into()).into();
        assert!(matches!(capture, ScanError::Capture(_)));
    }
}
