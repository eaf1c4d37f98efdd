//! nmap greppable output (-oG). Host lines look like:
//!
//! `Host: 192.168.1.1 (name)\tPorts: 22/open/tcp//ssh///, 443/open/tcp//https///\t...`
//!
//! Only `open` states count; `ssl|svc` prefers the `svc+s` mapping when one
//! exists.

use anyhow::{Context, Result};
use regex::Regex;

use crate::parser::{is_generic_service, map_service, Target};

lazy_static::lazy_static! {
    /// port/state/proto//service///
    static ref PORT_ENTRY: Regex = Regex::new(r"(\d+)/([^/]*)/([^/]*)//?([^/]*)").unwrap();
}

pub fn parse(path: &str) -> Result<Vec<Target>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("gnmap: {}", path))?;

    let mut targets = Vec::new();

    for line in content.lines() {
        if !line.starts_with("Host:") || !line.contains("Ports:") {
            continue;
        }

        let host = match extract_host(line) {
            Some(h) => h,
            None => continue,
        };

        let ports_idx = line.find("Ports:").unwrap() + "Ports:".len();
        let mut ports_section = &line[ports_idx..];
        if let Some(tab) = ports_section.find('\t') {
            ports_section = &ports_section[..tab];
        }

        for entry in ports_section.split(',') {
            let Some(caps) = PORT_ENTRY.captures(entry.trim()) else {
                continue;
            };

            let port: u32 = match caps[1].parse() {
                Ok(p) => p,
                Err(_) => continue,
            };
            if !(1..=65535).contains(&port) {
                continue;
            }
            if &caps[2] != "open" {
                continue;
            }

            let mut service = caps[4].trim().to_lowercase();
            if is_generic_service(&service) {
                continue;
            }

            // for "ssl|http", prefer "https" when it maps, else fall back
            if let Some(base) = service.strip_prefix("ssl|") {
                if let Some(module) = map_service(&format!("{}s", base)) {
                    targets.push(Target::new(host, port as u16, module));
                    continue;
                }
                service = base.to_string();
            }

            if let Some(module) = map_service(&service) {
                targets.push(Target::new(host, port as u16, module));
            }
        }
    }

    Ok(targets)
}

fn extract_host(line: &str) -> Option<&str> {
    line.strip_prefix("Host:")?.split_whitespace().next()
}
