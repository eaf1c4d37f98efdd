//! The standard-input protocol: one target per line, either a JSON object
//! (`{"host"|"ip", "port", "service"?|"protocol"?}` as emitted by
//! fingerprintx/naabu-style tools) or plain `host:port` text. The module is
//! taken from the service field when present, otherwise guessed from the
//! port; lines with unknown ports are skipped.

use std::collections::HashMap;
use std::io::BufRead;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::parser::{map_service, Target};

#[derive(Deserialize)]
struct StdinEntry {
    #[serde(default)]
    host: String,
    #[serde(default)]
    ip: String,
    #[serde(default)]
    port: u16,
    #[serde(default)]
    service: String,
    #[serde(default)]
    protocol: String,
}

lazy_static::lazy_static! {
    /// Common ports mapped to module names, the fallback when no service is named.
    static ref PORT_MAP: HashMap<u16, &'static str> = {
        let mut m = HashMap::new();
        m.insert(21, "ftp");
        m.insert(22, "ssh");
        m.insert(23, "telnet");
        m.insert(25, "smtp");
        m.insert(80, "http-basic");
        m.insert(110, "pop3");
        m.insert(143, "imap");
        m.insert(161, "snmp");
        m.insert(389, "ldap");
        m.insert(443, "http-basic");
        m.insert(445, "smb");
        m.insert(512, "rexec");
        m.insert(513, "rlogin");
        m.insert(514, "rsh");
        m.insert(554, "rtsp");
        m.insert(636, "ldaps");
        m.insert(993, "imap");
        m.insert(995, "pop3");
        m.insert(1080, "socks5");
        m.insert(1433, "mssql");
        m.insert(2379, "etcd");
        m.insert(2775, "smpp");
        m.insert(3306, "mysql");
        m.insert(3389, "rdp");
        m.insert(5038, "asterisk");
        m.insert(5222, "xmpp");
        m.insert(5432, "postgres");
        m.insert(5672, "amqp");
        m.insert(5900, "vnc");
        m.insert(5985, "winrm");
        m.insert(6379, "redis");
        m.insert(6667, "irc");
        m.insert(8080, "http-basic");
        m.insert(8200, "vault");
        m.insert(8443, "http-basic");
        m.insert(9000, "clickhouse");
        m.insert(10011, "teamspeak");
        m.insert(27017, "mongo");
        m.insert(50050, "cobaltstrike");
        m
    };
}

/// Parses piped targets. Unparseable lines are silently skipped.
pub fn parse_stdin(reader: impl BufRead) -> Result<Vec<Target>> {
    let mut targets = Vec::new();

    for line in reader.lines() {
        let line = line.context("reading stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let target = if line.starts_with('{') {
            parse_json_line(line)
        } else {
            parse_plain_line(line)
        };
        if let Some(target) = target {
            targets.push(target);
        }
    }

    Ok(targets)
}

fn parse_json_line(line: &str) -> Option<Target> {
    let entry: StdinEntry = serde_json::from_str(line).ok()?;
    let host = if !entry.host.is_empty() {
        entry.host
    } else {
        entry.ip
    };
    if host.is_empty() || entry.port == 0 {
        return None;
    }

    // explicit service name first, then protocol, then port fallback
    let svc = if !entry.service.is_empty() {
        entry.service.to_lowercase()
    } else {
        entry.protocol.to_lowercase()
    };
    let module = resolve_service(&svc, entry.port)?;
    Some(Target::new(&host, entry.port, module))
}

fn parse_plain_line(line: &str) -> Option<Target> {
    let idx = line.rfind(':')?;
    let host = &line[..idx];
    let port: u16 = line[idx + 1..].parse().ok()?;
    if host.is_empty() || port == 0 {
        return None;
    }
    let module = PORT_MAP.get(&port)?;
    Some(Target::new(host, port, module))
}

fn resolve_service(svc: &str, port: u16) -> Option<&'static str> {
    if !svc.is_empty() {
        if let Some(module) = map_service(svc) {
            return Some(module);
        }
        // some tools emit the module name directly
        if let Some((name, _)) = crate::modules::MODULES.get_key_value(svc) {
            return Some(*name);
        }
    }
    PORT_MAP.get(&port).copied()
}
