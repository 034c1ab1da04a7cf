use serde::{Deserialize, Serialize};

/// Detailed information about a network interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceInfo {
    /// Device system name (used for capture operations)
    pub device_name: String,

    /// Interface description
    pub description: Option<String>,

    /// IPv4 address (if available)
    pub ipv4_address: Option<String>,

    /// MAC address (if available)
    pub mac_address: Option<String>,

    /// Whether this is a loopback interface
    pub is_loopback: bool,

    /// Whether this interface is up/active
    pub is_up: bool,
}

impl InterfaceInfo {
    /// Create a new interface info with just the device name
    pub fn new(device_name: String) -> Self {
        Self {
            device_name,
            description: None,
            ipv4_address: None,
            mac_address: None,
            is_loopback: false,
            is_up: true,
        }
    }

    /// Get a formatted string with interface name and IP (if available)
    pub fn formatted_display(&self) -> String {
        match &self.ipv4_address {
            Some(ip) => format!("{} ({})", self.device_name, ip),
            None => self.device_name.clone(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

/// List capture-capable interfaces
#[cfg(not(target_os = "windows"))]
pub fn list_interfaces() -> Vec<InterfaceInfo> {
    use std::net::IpAddr;

    pnet_datalink::interfaces()
        .into_iter()
        .map(|iface| {
            let mut info = InterfaceInfo::new(iface.name.clone())
                .with_description(Some(iface.description.clone()).filter(|d| !d.is_empty()));

            // Get the first IPv4 address
            info.ipv4_address = iface.ips.iter().find_map(|ip| match ip.ip() {
                IpAddr::V4(v4) => Some(v4.to_string()),
                IpAddr::V6(_) => None,
            });
            info.mac_address = iface.mac.map(|mac| mac.to_string());
            info.is_loopback = iface.is_loopback();
            info.is_up = iface.is_up();
            info
        })
        .collect()
}

/// List capture-capable interfaces
///
/// pnet_datalink is unreliable against Npcap, so Windows asks pcap directly.
#[cfg(target_os = "windows")]
pub fn list_interfaces() -> Vec<InterfaceInfo> {
    match pcap::Device::list() {
        Ok(devices) => devices
            .into_iter()
            .map(|dev| InterfaceInfo::new(dev.name).with_description(dev.desc))
            .collect(),
        Err(e) => {
            log::error!("Failed to get interfaces from pcap: {}", e);
            Vec::new()
        }
    }
}
