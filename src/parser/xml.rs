//! nmap XML output (-oX). Walks `<nmaprun>/<host>/<ports>/<port>`, keeping
//! `state="open"` entries; `service/@tunnel="ssl"` prefers the `svc+s`
//! mapping.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::parser::{is_generic_service, map_service, Target};

#[derive(Deserialize)]
struct NmapRun {
    #[serde(rename = "host", default)]
    hosts: Vec<Host>,
}

#[derive(Deserialize)]
struct Host {
    #[serde(rename = "address", default)]
    addresses: Vec<Address>,
    #[serde(default)]
    ports: Ports,
}

#[derive(Deserialize)]
struct Address {
    #[serde(rename = "@addr")]
    addr: String,
    #[serde(rename = "@addrtype", default)]
    addr_type: String,
}

#[derive(Deserialize, Default)]
struct Ports {
    #[serde(rename = "port", default)]
    ports: Vec<Port>,
}

#[derive(Deserialize)]
struct Port {
    #[serde(rename = "@portid")]
    port_id: u32,
    state: State,
    #[serde(default)]
    service: Option<Service>,
}

#[derive(Deserialize)]
struct State {
    #[serde(rename = "@state")]
    state: String,
}

#[derive(Deserialize)]
struct Service {
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "@tunnel", default)]
    tunnel: String,
}

pub fn parse(path: &str) -> Result<Vec<Target>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("nmap xml: {}", path))?;
    let run: NmapRun =
        quick_xml::de::from_str(&content).with_context(|| format!("nmap xml parse: {}", path))?;

    let mut targets = Vec::new();

    for host in &run.hosts {
        let Some(addr) = best_address(&host.addresses) else {
            continue;
        };

        for port in &host.ports.ports {
            if port.state.state != "open" {
                continue;
            }
            if !(1..=65535).contains(&port.port_id) {
                continue;
            }
            let Some(service) = &port.service else {
                continue;
            };
            let name = service.name.to_lowercase();
            if is_generic_service(&name) {
                continue;
            }

            // tunnel="ssl": try the TLS variant of the service first
            if service.tunnel == "ssl" {
                if let Some(module) = map_service(&format!("{}s", name)) {
                    targets.push(Target::new(addr, port.port_id as u16, module));
                    continue;
                }
            }

            if let Some(module) = map_service(&name) {
                targets.push(Target::new(addr, port.port_id as u16, module));
            }
        }
    }

    Ok(targets)
}

/// Prefers the IPv4 address, then IPv6, then anything else.
fn best_address(addresses: &[Address]) -> Option<&str> {
    addresses
        .iter()
        .find(|a| a.addr_type == "ipv4")
        .or_else(|| addresses.iter().find(|a| a.addr_type == "ipv6"))
        .or_else(|| addresses.first())
        .map(|a| a.addr.as_str())
}
