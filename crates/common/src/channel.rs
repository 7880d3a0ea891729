//! Async channel bridge between the mDNS delivery thread and tokio
//!
//! The discovery library delivers presence events on its own plain thread.
//! Only this bridge crosses the boundary into the async runtime: the
//! delivery side pushes blocking, the tokio side awaits.

use async_channel::{Receiver, Sender, bounded};
use protocol::DeviceKey;

/// Presence change reported by the discovery feed.
///
/// Delivery is at-least-once and unordered across distinct scanners;
/// duplicate `Appeared` events for one key are expected and the registry
/// treats them as a reconnect.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// A scanner was advertised, either new or re-announced.
    Appeared {
        key: DeviceKey,
        name: String,
        base_url: String,
    },

    /// A scanner's advertisement was withdrawn.
    Disappeared { key: DeviceKey },
}

/// Handle for the tokio runtime (async side).
#[derive(Clone)]
pub struct DiscoveryBridge {
    event_rx: Receiver<DiscoveryEvent>,
}

impl DiscoveryBridge {
    /// Receive the next discovery event.
    pub async fn recv_event(&self) -> crate::Result<DiscoveryEvent> {
        self.event_rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Handle for the discovery delivery thread (blocking side).
pub struct DiscoveryWorker {
    event_tx: Sender<DiscoveryEvent>,
}

impl DiscoveryWorker {
    /// Send an event towards the tokio runtime (blocking).
    pub fn send_event(&self, event: DiscoveryEvent) -> crate::Result<()> {
        self.event_tx
            .send_blocking(event)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Create the bridge.
///
/// Returns (bridge for tokio, worker for the delivery thread).
pub fn create_discovery_bridge() -> (DiscoveryBridge, DiscoveryWorker) {
    let (event_tx, event_rx) = bounded(256);

    (DiscoveryBridge { event_rx }, DiscoveryWorker { event_tx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bridge_delivers_across_threads() {
        let (bridge, worker) = create_discovery_bridge();

        let handle = std::thread::spawn(move || {
            worker
                .send_event(DiscoveryEvent::Appeared {
                    key: DeviceKey("office._uscan._tcp.local.".to_string()),
                    name: "Office".to_string(),
                    base_url: "http://192.168.1.20:80/eSCL".to_string(),
                })
                .unwrap();
        });

        let event = bridge.recv_event().await.unwrap();
        assert!(matches!(event, DiscoveryEvent::Appeared { name, .. } if name == "Office"));
        handle.join().unwrap();
    }
}
