//! Scan-output parsing: nmap GNMAP and XML, Nessus v2 and Nexpose exports,
//! plus the stdin protocol. Extracts host/port/service triples and maps
//! scanner service names onto module names.

use std::collections::HashMap;

use anyhow::{anyhow, Result};

pub mod gnmap;
pub mod nessus;
pub mod nexpose;
pub mod stdin;
pub mod xml;

pub use stdin::parse_stdin;

/// A discovered service from scan output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    /// Module name (already mapped from the scanner's service name).
    pub service: String,
}

impl Target {
    pub fn new(host: &str, port: u16, service: &str) -> Self {
        Target {
            host: host.to_string(),
            port,
            service: service.to_string(),
        }
    }
}

lazy_static::lazy_static! {
    /// Scanner service names mapped to module names. Keys are lowercase names from
    /// nmap-services and friends; unmapped services are silently dropped.
    static ref SERVICE_MAP: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("ftp", "ftp");
        m.insert("ssh", "ssh");
        m.insert("telnet", "telnet");
        m.insert("smtp", "smtp");
        m.insert("smtps", "smtp");
        m.insert("submission", "smtp");
        m.insert("http", "http-basic");
        m.insert("https", "http-basic");
        m.insert("http-alt", "http-basic");
        m.insert("https-alt", "http-basic");
        m.insert("http-proxy", "http-basic");
        m.insert("pop3", "pop3");
        m.insert("pop3s", "pop3");
        m.insert("imap", "imap");
        m.insert("imaps", "imap");
        m.insert("snmp", "snmp");
        m.insert("ldap", "ldap");
        m.insert("ldaps", "ldaps");
        m.insert("ms-sql-s", "mssql");
        m.insert("ms-sql-m", "mssql");
        m.insert("mysql", "mysql");
        m.insert("postgresql", "postgres");
        m.insert("redis", "redis");
        m.insert("mongodb", "mongo");
        m.insert("mongod", "mongo");
        m.insert("vnc", "vnc");
        m.insert("vnc-http", "vnc");
        m.insert("amqp", "amqp");
        m.insert("amqps", "amqp");
        m.insert("smpp", "smpp");
        m.insert("smb", "smb");
        m.insert("microsoft-ds", "smb");
        m.insert("netbios-ssn", "smb");
        m.insert("socks5", "socks5");
        m.insert("socks", "socks5");
        m.insert("rtsp", "rtsp");
        m.insert("xmpp-client", "xmpp");
        m.insert("xmpp-server", "xmpp");
        m.insert("jabber", "xmpp");
        m.insert("rexec", "rexec");
        m.insert("exec", "rexec");
        m.insert("rlogin", "rlogin");
        m.insert("login", "rlogin");
        m.insert("rsh", "rsh");
        m.insert("shell", "rsh");
        m.insert("irc", "irc");
        m.insert("ircs", "irc");
        m.insert("asterisk", "asterisk");
        m.insert("clickhouse", "clickhouse");
        m.insert("etcd-client", "etcd");
        m.insert("vault", "vault");
        m.insert("teamspeak", "teamspeak");
        m.insert("cobaltstrike", "cobaltstrike");
        m.insert("wsman", "winrm");
        m.insert("wsmans", "winrm");
        m.insert("winrm", "winrm");
        m.insert("ms-wbt-server", "rdp");
        m
    };
}

/// Maps a scanner service name to a module name.
pub fn map_service(service: &str) -> Option<&'static str> {
    SERVICE_MAP.get(service).copied()
}

/// Service names that never produce a target.
pub fn is_generic_service(service: &str) -> bool {
    service.is_empty() || service == "unknown" || service == "general"
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Gnmap,
    NmapXml,
    Nessus,
    Nexpose,
}

/// Sniffs the first lines of a file to determine the scan format.
pub fn detect_format(path: &str) -> Result<Format> {
    let content = std::fs::read_to_string(path)?;
    for line in content.lines().take(20) {
        let line = line.trim_start();
        if line.contains("<NessusClientData_v2") {
            return Ok(Format::Nessus);
        }
        if line.contains("<NexposeReport") {
            return Ok(Format::Nexpose);
        }
        if line.contains("<nmaprun") {
            return Ok(Format::NmapXml);
        }
        if (line.starts_with("# Nmap") && line.contains("scan")) || line.starts_with("Host:") {
            return Ok(Format::Gnmap);
        }
    }
    Err(anyhow!("unable to detect scan output format for {}", path))
}

/// Auto-detects the format and parses the scan file.
pub fn parse_file(path: &str) -> Result<Vec<Target>> {
    match detect_format(path)? {
        Format::Gnmap => gnmap::parse(path),
        Format::NmapXml => xml::parse(path),
        Format::Nessus => nessus::parse(path),
        Format::Nexpose => nexpose::parse(path),
    }
}
