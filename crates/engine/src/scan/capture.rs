//! Capture seam and the single-capture request flow

use crate::scan::registry::DeviceRegistry;
use async_trait::async_trait;
use protocol::{CaptureError, DeviceInfo, ScanError, ScanSettings};
use tracing::debug;

/// Drives one scanner through one capture operation.
///
/// The production implementation speaks eSCL over HTTP; tests substitute
/// recorders and failure injectors.
#[async_trait]
pub trait CaptureClient: Send + Sync {
    /// Run one capture and return the page images in document order. A
    /// feeder pass may yield several pages; the platen yields one.
    async fn capture(
        &self,
        device: &DeviceInfo,
        settings: &ScanSettings,
    ) -> Result<Vec<Vec<u8>>, CaptureError>;
}

/// Selection -> acquisition -> capture -> release, as one step of the
/// request path.
///
/// The lease is dropped on every exit, including capture failure, so the
/// scanner never stays busy after this returns. There is no mid-capture
/// cancellation: the capture call runs to completion once started.
pub async fn capture_pages(
    registry: &DeviceRegistry,
    client: &dyn CaptureClient,
    settings: &ScanSettings,
    override_name: Option<&str>,
) -> Result<Vec<Vec<u8>>, ScanError> {
    let device = registry.select(override_name)?;
    let lease = registry.acquire(&device.key)?;

    debug!(scanner = %device.name, "Capture starting");
    let pages = client.capture(&device, settings).await?;
    debug!(scanner = %device.name, pages = pages.len(), "Capture finished");

    drop(lease);
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{DeviceKey, SelectError};

    struct FixedPages(Vec<Vec<u8>>);

    #[async_trait]
    impl CaptureClient for FixedPages {
        async fn capture(
            &self,
            _device: &DeviceInfo,
            _settings: &ScanSettings,
        ) -> Result<Vec<Vec<u8>>, CaptureError> {
            Ok(self.0.clone())
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl CaptureClient for AlwaysFails {
        async fn capture(
            &self,
            _device: &DeviceInfo,
            _settings: &ScanSettings,
        ) -> Result<Vec<Vec<u8>>, CaptureError> {
            Err(CaptureError::PageTransfer("jam".to_string()))
        }
    }

    fn registry_with_office() -> (DeviceRegistry, DeviceKey) {
        let registry = DeviceRegistry::new();
        let key = DeviceKey("office._uscan._tcp.local.".to_string());
        registry.on_device_appeared(key.clone(), "Office", "http://office:80/eSCL");
        (registry, key)
    }

    #[tokio::test]
    async fn test_capture_releases_device_on_success() {
        let (registry, key) = registry_with_office();
        let client = FixedPages(vec![vec![1, 2, 3]]);

        let pages = capture_pages(&registry, &client, &ScanSettings::default(), None)
            .await
            .unwrap();
        assert_eq!(pages, vec![vec![1, 2, 3]]);

        // Released: a fresh acquisition succeeds.
        assert!(registry.acquire(&key).is_ok());
    }

    #[tokio::test]
    async fn test_capture_releases_device_on_failure() {
        let (registry, key) = registry_with_office();

        let err = capture_pages(&registry, &AlwaysFails, &ScanSettings::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Capture(_)));

        assert!(registry.acquire(&key).is_ok());
    }

    #[tokio::test]
    async fn test_busy_only_device_fails_selection() {
        let (registry, key) = registry_with_office();
        let _lease = registry.acquire(&key).unwrap();

        // Selection no longer sees the busy scanner, so the single-device
        // setup surfaces this as a selection failure.
        let err = capture_pages(
            &registry,
            &FixedPages(vec![]),
            &ScanSettings::default(),
            None,
        )
        .await
        .unwrap_err();
        assert_eq!(err, ScanError::Select(SelectError::NoIdleDevices));
    }
}
