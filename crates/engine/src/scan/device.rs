//! Per-device lifecycle
//!
//! An entry is created the first time the discovery feed announces a
//! scanner and retained for the life of the process; disappearance only
//! marks it unreachable, so a reconnect resumes the same identity.
//! Transitions run under the registry lock and are therefore sequential
//! per device.

use protocol::{AcquireError, DeviceInfo, DeviceKey, DeviceState};

/// Registry entry for one scanner.
#[derive(Debug, Clone)]
pub(crate) struct DeviceEntry {
    pub key: DeviceKey,
    pub name: String,
    pub base_url: String,
    pub state: DeviceState,
}

impl DeviceEntry {
    pub fn new(key: DeviceKey, name: String, base_url: String) -> Self {
        Self {
            key,
            name,
            base_url,
            state: DeviceState::Idle,
        }
    }

    pub fn info(&self) -> DeviceInfo {
        DeviceInfo {
            key: self.key.clone(),
            name: self.name.clone(),
            base_url: self.base_url.clone(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == DeviceState::Idle
    }

    /// Announcement for a known entry: reconnect or duplicate event.
    /// Back to idle, metadata refreshed (the address may have changed).
    pub fn mark_announced(&mut self, name: String, base_url: String) {
        self.name = name;
        self.base_url = base_url;
        self.state = DeviceState::Idle;
    }

    pub fn mark_unreachable(&mut self) {
        self.state = DeviceState::Unreachable;
    }

    /// Guarded Idle -> Busy transition used by acquisition. No waiting:
    /// a non-idle scanner is an immediate error for the caller to report.
    pub fn try_claim(&mut self) -> Result<(), AcquireError> {
        match self.state {
            DeviceState::Idle => {
                self.state = DeviceState::Busy;
                Ok(())
            }
            DeviceState::Busy => Err(AcquireError::DeviceBusy(self.name.clone())),
            DeviceState::Unreachable => Err(AcquireError::DeviceUnreachable(self.name.clone())),
        }
    }

    /// Busy -> Idle on lease release. Unreachable sticks: losing the
    /// advertisement mid-capture outranks the release.
    pub fn release(&mut self) {
        if self.state == DeviceState::Busy {
            self.state = DeviceState::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> DeviceEntry {
        DeviceEntry::new(
            DeviceKey("office._uscan._tcp.local.".to_string()),
            "Office".to_string(),
            "http://192.168.1.20:80/eSCL".to_string(),
        )
    }

    #[test]
    fn test_new_entry_is_idle() {
        assert!(entry().is_idle());
    }

    #[test]
    fn test_claim_moves_to_busy_once() {
        let mut e = entry();
        assert!(e.try_claim().is_ok());
        assert_eq!(e.state, DeviceState::Busy);
        assert_eq!(
            e.try_claim(),
            Err(AcquireError::DeviceBusy("Office".to_string()))
        );
    }

    #[test]
    fn test_unreachable_claim_is_rejected() {
        let mut e = entry();
        e.mark_unreachable();
        assert_eq!(
            e.try_claim(),
            Err(AcquireError::DeviceUnreachable("Office".to_string()))
        );
    }

    #[test]
    fn test_release_only_clears_busy() {
        let mut e = entry();
        e.try_claim().unwrap();
        e.release();
        assert_eq!(e.state, DeviceState::Idle);

        // Disappearance during a lease wins over the release.
        e.try_claim().unwrap();
        e.mark_unreachable();
        e.release();
        assert_eq!(e.state, DeviceState::Unreachable);
    }

    #[test]
    fn test_announcement_refreshes_metadata() {
        let mut e = entry();
        e.mark_unreachable();
        e.mark_announced("Office".to_string(), "http://192.168.1.44:80/eSCL".to_string());
        assert!(e.is_idle());
        assert_eq!(e.base_url, "http://192.168.1.44:80/eSCL");
    }
}
