//! Outbound interface selection.

use std::net::IpAddr;

use anyhow::{anyhow, Result};

/// Returns the first IPv4 address bound to the named network interface.
/// For loopback interfaces ("lo", "lo0") loopback addresses are included;
/// everywhere else they are skipped.
pub fn interface_ipv4(name: &str) -> Result<IpAddr> {
    if name.is_empty() {
        return Err(anyhow!("interface name is empty"));
    }

    let is_loopback_iface = name == "lo" || name == "lo0";

    let addrs = if_addrs::get_if_addrs()?;
    for iface in addrs {
        if iface.name != name {
            continue;
        }
        let ip = iface.ip();
        if !ip.is_ipv4() {
            continue;
        }
        if ip.is_loopback() && !is_loopback_iface {
            continue;
        }
        return Ok(ip);
    }

    Err(anyhow!("no IPv4 address found on interface {:?}", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_iface() -> &'static str {
        if cfg!(target_os = "macos") {
            "lo0"
        } else {
            "lo"
        }
    }

    #[test]
    fn loopback_interface_yields_loopback_address() {
        let name = loopback_iface();
        match interface_ipv4(name) {
            Ok(ip) => assert!(ip.is_loopback(), "{} returned {}", name, ip),
            // containers without a loopback interface entry are fine too
            Err(_) => {}
        }
    }

    #[test]
    fn nonexistent_interface_is_an_error() {
        assert!(interface_ipv4("nonexistent_iface_xyz_123").is_err());
    }

    #[test]
    fn empty_name_is_an_error() {
        assert!(interface_ipv4("").is_err());
    }
}
