//! Capture device enumeration and lookup

use std::net::{IpAddr, Ipv4Addr};

use packetpump_core::{Error, Result};
use pnet_datalink::NetworkInterface;

/// Information about a device available for capture
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Device name (e.g., "eth0", "wlan0")
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Addresses assigned to this device
    pub addresses: Vec<IpAddr>,
    /// Whether the device is up
    pub is_up: bool,
    /// Whether the device is a loopback
    pub is_loopback: bool,
}

impl From<&NetworkInterface> for DeviceInfo {
    fn from(iface: &NetworkInterface) -> Self {
        DeviceInfo {
            name: iface.name.clone(),
            description: iface.description.clone(),
            addresses: iface.ips.iter().map(|network| network.ip()).collect(),
            is_up: iface.is_up(),
            is_loopback: iface.is_loopback(),
        }
    }
}

/// List all devices visible to the capture runtime.
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let interfaces = pnet_datalink::interfaces();

    if interfaces.is_empty() {
        return Err(Error::adapter(
            "No capture devices found. Are you running with sufficient privileges?",
        ));
    }

    Ok(interfaces.iter().map(DeviceInfo::from).collect())
}

/// Find the name of the device that has `ip` assigned, if any.
pub fn find_device(ip: IpAddr) -> Option<String> {
    pnet_datalink::interfaces()
        .into_iter()
        .find(|iface| iface.ips.iter().any(|network| network.ip() == ip))
        .map(|iface| iface.name)
}

/// IPv4 netmask of a device, used when compiling filters for a live open.
/// `None` when the device has no IPv4 network, which open reports through
/// its warning path rather than failing.
pub(crate) fn lookup_ipv4_netmask(device: &str) -> Option<Ipv4Addr> {
    pnet_datalink::interfaces()
        .into_iter()
        .find(|iface| iface.name == device)?
        .ips
        .iter()
        .find_map(|network| match (network.ip(), network.mask()) {
            (IpAddr::V4(_), IpAddr::V4(mask)) => Some(mask),
            _ => None,
        })
}
