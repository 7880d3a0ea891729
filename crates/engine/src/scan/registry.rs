//! Scanner registry
//!
//! Holds every scanner the discovery feed has ever announced and
//! arbitrates exclusive access. Mutators run from the discovery drain
//! task while the chat request path reads, selects, and acquires; one
//! mutex around the map keeps every contract operation linearizable and
//! every read a consistent snapshot. The lock is never held across an
//! await.

use crate::scan::device::DeviceEntry;
use protocol::{AcquireError, DeviceInfo, DeviceKey, SelectError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Clone, Default)]
pub struct DeviceRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

#[derive(Default)]
struct RegistryInner {
    devices: HashMap<DeviceKey, DeviceEntry>,
    /// Keys in the order first discovered; selection prefers earlier entries.
    order: Vec<DeviceKey>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discovery feed: scanner announced. Always succeeds. A known key is
    /// reset to idle, which covers both duplicate announcements and a
    /// reconnect that never produced a disappearance event.
    pub fn on_device_appeared(
        &self,
        key: DeviceKey,
        name: impl Into<String>,
        base_url: impl Into<String>,
    ) {
        let name = name.into();
        let base_url = base_url.into();
        let mut inner = self.lock();
        match inner.devices.get_mut(&key) {
            Some(entry) => {
                info!(key = %key, name = %name, "Scanner re-announced, resetting to idle");
                entry.mark_announced(name, base_url);
            }
            None => {
                info!(key = %key, name = %name, "New scanner discovered");
                inner.order.push(key.clone());
                inner
                    .devices
                    .insert(key.clone(), DeviceEntry::new(key, name, base_url));
            }
        }
    }

    /// Discovery feed: advertisement withdrawn. The entry is kept so a
    /// reconnect resumes the same identity; unknown keys are ignored.
    pub fn on_device_disappeared(&self, key: &DeviceKey) {
        let mut inner = self.lock();
        match inner.devices.get_mut(key) {
            Some(entry) => {
                info!(key = %key, "Scanner went away, marking unreachable");
                entry.mark_unreachable();
            }
            None => {
                debug!(key = %key, "Disappearance for unknown scanner ignored");
            }
        }
    }

    /// Snapshot of idle scanners, in discovery order.
    pub fn list_idle(&self) -> Vec<DeviceInfo> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .filter_map(|key| inner.devices.get(key))
            .filter(|entry| entry.is_idle())
            .map(DeviceEntry::info)
            .collect()
    }

    /// Case-sensitive exact match against the display name, among idle
    /// scanners only. A busy or unreachable scanner is not selectable even
    /// by explicit override.
    pub fn find_by_name(&self, name: &str) -> Option<DeviceInfo> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .filter_map(|key| inner.devices.get(key))
            .find(|entry| entry.is_idle() && entry.name == name)
            .map(DeviceEntry::info)
    }

    /// Selection policy: explicit override name if configured, else the
    /// first idle scanner in discovery order.
    ///
    /// Pure read over the current snapshot; the returned scanner may stop
    /// being idle before acquisition, which re-checks and can fail with
    /// `DeviceBusy`, a distinct error the caller must not conflate with
    /// selection failure.
    pub fn select(&self, override_name: Option<&str>) -> Result<DeviceInfo, SelectError> {
        match override_name {
            Some(name) if !name.is_empty() => self
                .find_by_name(name)
                .ok_or_else(|| SelectError::NoMatchingDevice(name.to_string())),
            _ => self
                .list_idle()
                .into_iter()
                .next()
                .ok_or(SelectError::NoIdleDevices),
        }
    }

    /// Claim a scanner for one capture. Fails immediately if it is not
    /// idle; whether to retry is the caller's decision.
    pub fn acquire(&self, key: &DeviceKey) -> Result<DeviceLease, AcquireError> {
        let mut inner = self.lock();
        let entry = inner
            .devices
            .get_mut(key)
            .ok_or_else(|| AcquireError::UnknownDevice(key.to_string()))?;
        entry.try_claim()?;
        debug!(key = %key, "Scanner acquired");

        Ok(DeviceLease {
            registry: Arc::clone(&self.inner),
            key: key.clone(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // A poisoned lock means a peer thread panicked mid-update.
        self.inner.lock().expect("device registry mutex poisoned")
    }
}

/// Exclusive claim on one scanner for the duration of a capture call.
///
/// Dropping the lease returns the scanner to idle on every exit path of
/// the capture, including errors. If the scanner disappeared while
/// leased, the unreachable state is left in place.
pub struct DeviceLease {
    registry: Arc<Mutex<RegistryInner>>,
    key: DeviceKey,
}

impl DeviceLease {
    pub fn key(&self) -> &DeviceKey {
        &self.key
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        let mut inner = self.registry.lock().expect("device registry mutex poisoned");
        if let Some(entry) = inner.devices.get_mut(&self.key) {
            entry.release();
            debug!(key = %self.key, "Scanner released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::DeviceState;

    fn key(s: &str) -> DeviceKey {
        DeviceKey(format!("{s}._uscan._tcp.local."))
    }

    fn registry_with(names: &[&str]) -> DeviceRegistry {
        let registry = DeviceRegistry::new();
        for name in names {
            registry.on_device_appeared(key(name), *name, format!("http://{name}:80/eSCL"));
        }
        registry
    }

    #[test]
    fn test_appeared_twice_keeps_one_idle_entry() {
        let registry = registry_with(&["Office"]);
        registry.on_device_appeared(key("Office"), "Office", "http://Office:80/eSCL");

        let idle = registry.list_idle();
        assert_eq!(idle.len(), 1);
        assert_eq!(idle[0].name, "Office");
    }

    #[test]
    fn test_disappeared_unknown_is_a_noop() {
        let registry = registry_with(&["Office"]);
        registry.on_device_disappeared(&key("Attic"));
        assert_eq!(registry.list_idle().len(), 1);
    }

    #[test]
    fn test_disappeared_hides_from_selection_until_reconnect() {
        let registry = registry_with(&["Office"]);
        registry.on_device_disappeared(&key("Office"));
        assert!(registry.list_idle().is_empty());
        assert_eq!(registry.select(None), Err(SelectError::NoIdleDevices));

        registry.on_device_appeared(key("Office"), "Office", "http://Office:80/eSCL");
        assert_eq!(registry.select(None).unwrap().name, "Office");
    }

    #[test]
    fn test_selection_prefers_discovery_order() {
        let registry = registry_with(&["Office", "Attic"]);
        assert_eq!(registry.select(None).unwrap().name, "Office");
    }

    #[test]
    fn test_selection_override_is_exact_and_idle_only() {
        let registry = registry_with(&["Office", "Attic"]);
        assert_eq!(registry.select(Some("Attic")).unwrap().name, "Attic");
        assert_eq!(
            registry.select(Some("office")),
            Err(SelectError::NoMatchingDevice("office".to_string()))
        );

        let _lease = registry.acquire(&key("Attic")).unwrap();
        assert_eq!(
            registry.select(Some("Attic")),
            Err(SelectError::NoMatchingDevice("Attic".to_string()))
        );
    }

    #[test]
    fn test_empty_override_falls_back_to_first_idle() {
        let registry = registry_with(&["Office"]);
        assert_eq!(registry.select(Some("")).unwrap().name, "Office");
    }

    #[test]
    fn test_acquire_is_exclusive_until_release() {
        let registry = registry_with(&["Office"]);
        let lease = registry.acquire(&key("Office")).unwrap();
        assert_eq!(
            registry.acquire(&key("Office")).err(),
            Some(AcquireError::DeviceBusy("Office".to_string()))
        );

        drop(lease);
        assert!(registry.acquire(&key("Office")).is_ok());
    }

    #[test]
    fn test_acquire_unknown_device() {
        let registry = registry_with(&[]);
        assert!(matches!(
            registry.acquire(&key("Office")),
            Err(AcquireError::UnknownDevice(_))
        ));
    }

    #[test]
    fn test_disappearance_during_lease_overrides_release() {
        let registry = registry_with(&["Office"]);
        let lease = registry.acquire(&key("Office")).unwrap();
        registry.on_device_disappeared(&key("Office"));
        drop(lease);

        let inner = registry.inner.lock().unwrap();
        assert_eq!(
            inner.devices.get(&key("Office")).unwrap().state,
            DeviceState::Unreachable
        );
    }
}
