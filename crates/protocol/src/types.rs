//! Device, session, and capture-settings types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable network identity of a scanner (the DNS-SD service fullname).
///
/// Unique per physical unit and never reused for a different one; the
/// registry keys its entries by this so a reconnect resumes the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceKey(pub String);

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scanner lifecycle state as tracked by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    /// Reachable and not serving a capture.
    Idle,
    /// An acquisition holds the scanner; capture requests are rejected.
    Busy,
    /// The advertisement was withdrawn; the entry is kept for reconnect.
    Unreachable,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceState::Idle => "idle",
            DeviceState::Busy => "busy",
            DeviceState::Unreachable => "unreachable",
        };
        f.write_str(s)
    }
}

/// Public snapshot of a registry entry.
///
/// Handed to selection callers and the capture client; holds no reference
/// back into the registry, so a stale snapshot is harmless (acquisition
/// re-checks the live state).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub key: DeviceKey,
    /// Human-readable label from the advertisement, used for override matching.
    pub name: String,
    /// eSCL endpoint root, e.g. `http://192.168.1.20:80/eSCL`.
    pub base_url: String,
}

/// Owner of a scan session.
///
/// Both halves are required: the user for the single-ownership invariant,
/// the chat for routing replies and expiry notifications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerKey {
    pub user: String,
    pub chat: i64,
}

/// Opaque session token, unique per creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Physical input source for a capture, as eSCL names them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputSource {
    /// Flatbed glass; one page per capture.
    #[default]
    Platen,
    /// Automatic document feeder; one capture may yield several pages.
    Feeder,
}

impl InputSource {
    /// The value the eSCL ScanSettings document expects.
    pub fn escl_name(self) -> &'static str {
        match self {
            InputSource::Platen => "Platen",
            InputSource::Feeder => "Feeder",
        }
    }
}

/// Fixed capture configuration, chosen once at startup.
///
/// Not negotiated per request; only the input source is operator-tunable,
/// through the deployment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSettings {
    pub color_mode: String,
    pub input_source: InputSource,
    pub document_format: String,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            color_mode: "RGB24".to_string(),
            input_source: InputSource::default(),
            document_format: "image/jpeg".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_source_escl_names() {
        assert_eq!(InputSource::Platen.escl_name(), "Platen");
        assert_eq!(InputSource::Feeder.escl_name(), "Feeder");
    }

    #[test]
    fn test_input_source_parses_lowercase_only() {
        assert_eq!(
            serde_json::from_str::<InputSource>("\"feeder\"").unwrap(),
            InputSource::Feeder
        );
        assert!(serde_json::from_str::<InputSource>("\"Duplex\"").is_err());
        assert!(serde_json::from_str::<InputSource>("\"Feeder\"").is_err());
    }

    #[test]
    fn test_default_settings() {
        let settings = ScanSettings::default();
        assert_eq!(settings.color_mode, "RGB24");
        assert_eq!(settings.input_source, InputSource::Platen);
        assert_eq!(settings.document_format, "image/jpeg");
    }
}
