//! mDNS discovery feed
//!
//! Browses the eSCL service type and forwards presence changes to the
//! registry through the discovery bridge. mdns-sd delivers events on its
//! own thread; only the bridge crosses into tokio, and only the drain
//! task touches the registry mutators.

use common::{DiscoveryBridge, DiscoveryEvent, DiscoveryWorker, Error};
use engine::DeviceRegistry;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use protocol::DeviceKey;
use std::net::IpAddr;
use tracing::{debug, info, warn};

/// eSCL scanners advertise under this DNS-SD service type.
pub const SERVICE_TYPE: &str = "_uscan._tcp.local.";

/// Start browsing for scanners.
///
/// The returned daemon must be kept alive; dropping it stops discovery.
/// Events are pushed onto the bridge from the delivery thread.
pub fn spawn_discovery(worker: DiscoveryWorker) -> common::Result<ServiceDaemon> {
    let mdns = ServiceDaemon::new().map_err(|e| Error::Discovery(e.to_string()))?;
    let receiver = mdns
        .browse(SERVICE_TYPE)
        .map_err(|e| Error::Discovery(e.to_string()))?;

    std::thread::spawn(move || {
        while let Ok(event) = receiver.recv() {
            match event {
                ServiceEvent::ServiceResolved(service) => {
                    let key = DeviceKey(service.get_fullname().to_string());
                    let name = display_name(&service);
                    let Some(base_url) = base_url(&service) else {
                        warn!(key = %key, "Resolved scanner without an address, ignoring");
                        continue;
                    };
                    info!(key = %key, name = %name, url = %base_url, "Scanner advertised");
                    let appeared = DiscoveryEvent::Appeared { key, name, base_url };
                    if worker.send_event(appeared).is_err() {
                        break;
                    }
                }
                ServiceEvent::ServiceRemoved(_ty, fullname) => {
                    let key = DeviceKey(fullname);
                    info!(key = %key, "Scanner advertisement withdrawn");
                    if worker.send_event(DiscoveryEvent::Disappeared { key }).is_err() {
                        break;
                    }
                }
                other => {
                    debug!(?other, "Ignoring mdns event");
                }
            }
        }
        debug!("Discovery delivery thread finished");
    });

    Ok(mdns)
}

/// Drain the bridge and apply presence changes to the registry. Runs until
/// the worker side hangs up.
pub async fn apply_events(bridge: DiscoveryBridge, registry: DeviceRegistry) {
    while let Ok(event) = bridge.recv_event().await {
        match event {
            DiscoveryEvent::Appeared { key, name, base_url } => {
                registry.on_device_appeared(key, name, base_url);
            }
            DiscoveryEvent::Disappeared { key } => {
                registry.on_device_disappeared(&key);
            }
        }
    }
    debug!("Discovery bridge closed, applier stopping");
}

/// Advertised model name from the `ty` TXT record, else the instance label.
fn display_name(service: &ServiceInfo) -> String {
    if let Some(ty) = service.get_property_val_str("ty") {
        if !ty.is_empty() {
            return ty.to_string();
        }
    }
    instance_label(service.get_fullname())
}

/// `"Office\ Scanner._uscan._tcp.local."` -> `"Office Scanner"`.
///
/// DNS labels do not permit whitespace, so advertisers escape it; the
/// backslashes look wrong in the chat UI and are stripped here.
fn instance_label(fullname: &str) -> String {
    let instance = fullname.split("._").next().unwrap_or(fullname);
    instance.replace('\\', "")
}

/// eSCL endpoint root: `http://host:port/<rs>`, with the resource path
/// taken from the `rs` TXT record and defaulting to `eSCL`.
fn base_url(service: &ServiceInfo) -> Option<String> {
    let addr = service.get_addresses().iter().next().copied()?;
    let rs = service.get_property_val_str("rs").unwrap_or("eSCL");
    let rs = rs.trim_matches('/');
    let rs = if rs.is_empty() { "eSCL" } else { rs };

    let url = match addr {
        IpAddr::V4(v4) => format!("http://{}:{}/{}", v4, service.get_port(), rs),
        IpAddr::V6(v6) => format!("http://[{}]:{}/{}", v6, service.get_port(), rs),
    };
    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_label_strips_escapes_and_suffix() {
        assert_eq!(
            instance_label("Office\\ Scanner._uscan._tcp.local."),
            "Office Scanner"
        );
        assert_eq!(instance_label("Attic._uscan._tcp.local."), "Attic");
        assert_eq!(instance_label("plain"), "plain");
    }
}
