//! Protocol module registry and the shared handler contract.
//!
//! Every module exposes `async fn check(...) -> Result<bool>` with the same
//! meaning everywhere:
//!
//! * `Ok(true)`: network reached, authentication accepted
//! * `Ok(false)`: network reached, authentication rejected (wrong creds)
//! * `Err(e)`: no auth decision was reached (dial/TLS/protocol/timeout);
//!   the engine counts this against the retry budget
//!
//! Handlers never mutate the target and close their sockets on every path.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use anyhow::Result;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;

pub mod asn1;
pub mod ntlm;

pub mod amqp;
pub mod asterisk;
pub mod cisco;
pub mod clickhouse;
pub mod cobaltstrike;
pub mod etcd;
pub mod ftp;
pub mod http_basic;
pub mod imap;
pub mod irc;
pub mod ldap;
pub mod mongo;
pub mod mssql;
pub mod mysql;
pub mod pop3;
pub mod postgres;
pub mod rdp;
pub mod redis;
pub mod rexec;
pub mod rlogin;
pub mod rsh;
pub mod rtsp;
pub mod smb;
pub mod smpp;
pub mod smtp;
pub mod snmp;
pub mod socks5;
pub mod ssh;
pub mod teamspeak;
pub mod telnet;
pub mod vault;
pub mod vnc;
pub mod winrm;
pub mod xmpp;

/// One bruteforce target. `encryption` starts true and is flipped by the
/// engine's probe when only plaintext works; `success` latches true on the
/// first accepted credential; `retries` counts connection errors.
#[derive(Debug)]
pub struct Target {
    pub ip: IpAddr,
    pub port: u16,
    /// Raw input string before DNS resolution (e.g. "vault.example.com:8200").
    pub original_target: String,
    pub encryption: AtomicBool,
    pub success: AtomicBool,
    pub retries: AtomicU32,
}

impl Target {
    pub fn new(ip: IpAddr, port: u16, original_target: String) -> Self {
        Target {
            ip,
            port,
            original_target,
            encryption: AtomicBool::new(true),
            success: AtomicBool::new(false),
            retries: AtomicU32::new(0),
        }
    }

    /// `ip:port`, IPv6 bracketed, ready for a dialer.
    pub fn addr(&self) -> String {
        SocketAddr::new(self.ip, self.port).to_string()
    }

    pub fn encryption(&self) -> bool {
        self.encryption.load(Ordering::Relaxed)
    }

    /// The host portion of the original input, brackets and port stripped.
    pub fn original_host(&self) -> &str {
        let s = self.original_target.as_str();
        if let Some(rest) = s.strip_prefix('[') {
            if let Some(end) = rest.find(']') {
                return &rest[..end];
            }
        }
        // one colon is host:port; more means a bare IPv6 address
        match s.rfind(':') {
            Some(idx) if s.matches(':').count() == 1 => &s[..idx],
            _ => s,
        }
    }

    /// The original hostname when the input was a name rather than an IP.
    /// Used for `Host:` headers and TLS SNI.
    pub fn hostname(&self) -> Option<&str> {
        let host = self.original_host();
        if host.is_empty() || host.parse::<IpAddr>().is_ok() {
            None
        } else {
            Some(host)
        }
    }

    /// SNI value: the original hostname if there was one, the IP otherwise.
    pub fn sni(&self) -> String {
        match self.hostname() {
            Some(h) => h.to_string(),
            None => self.ip.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: &str, password: &str) -> Self {
        Credential {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

/// Object-safe byte stream used by text-protocol modules that speak either
/// plaintext or TLS depending on the target's encryption flag.
pub trait AsyncStream: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send {}
impl<T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send> AsyncStream for T {}

/// Dials the target, wrapping in TLS when its encryption flag is set.
pub async fn dial_maybe_tls(
    dialer: &Dialer,
    target: &Target,
) -> Result<Box<dyn AsyncStream>> {
    let addr = target.addr();
    if target.encryption() {
        Ok(Box::new(dialer.dial_tls(&addr, &target.sni()).await?))
    } else {
        Ok(Box::new(dialer.dial(&addr).await?))
    }
}

pub type HandlerFuture<'a> = BoxFuture<'a, Result<bool>>;

/// Uniform handler signature; see module docs for the return discipline.
pub type ModuleHandler = for<'a> fn(
    &'a CancellationToken,
    &'a Dialer,
    Duration,
    &'a Target,
    &'a Credential,
) -> HandlerFuture<'a>;

/// Static description of one protocol module. The default credentials are
/// what the engine's probe tries first; several are well-known factory
/// defaults rather than good guesses.
pub struct Module {
    pub default_port: u16,
    pub default_username: &'static str,
    pub default_password: &'static str,
    pub handler: ModuleHandler,
}

macro_rules! module {
    ($port:expr, $user:expr, $pass:expr, $path:path) => {{
        fn handler<'a>(
            token: &'a CancellationToken,
            dialer: &'a Dialer,
            timeout: Duration,
            target: &'a Target,
            credential: &'a Credential,
        ) -> HandlerFuture<'a> {
            Box::pin($path(token, dialer, timeout, target, credential))
        }
        Module {
            default_port: $port,
            default_username: $user,
            default_password: $pass,
            handler,
        }
    }};
}

lazy_static::lazy_static! {
    /// All available modules, keyed by subcommand name.
    pub static ref MODULES: HashMap<&'static str, Module> = {
        let mut m = HashMap::new();
        m.insert("amqp", module!(5672, "guest", "guest", amqp::check));
        m.insert("asterisk", module!(5038, "admin", "admin", asterisk::check));
        m.insert("cisco", module!(23, "cisco", "cisco", cisco::check));
        m.insert("cisco-enable", module!(23, "cisco", "cisco", cisco::check_enable));
        m.insert("clickhouse", module!(9000, "default", "", clickhouse::check));
        m.insert("cobaltstrike", module!(50050, "", "password", cobaltstrike::check));
        m.insert("etcd", module!(2379, "root", "123", etcd::check));
        m.insert("ftp", module!(21, "anonymous", "anonymous", ftp::check));
        m.insert("http-basic", module!(80, "admin", "admin", http_basic::check));
        m.insert("imap", module!(143, "admin", "admin", imap::check));
        m.insert("irc", module!(6667, "netbrute", "password", irc::check));
        m.insert("ldap", module!(389, "cn=admin,dc=example,dc=com", "admin", ldap::check));
        m.insert("ldaps", module!(636, "cn=admin,dc=example,dc=com", "admin", ldap::check));
        m.insert("mongo", module!(27017, "", "", mongo::check));
        m.insert("mssql", module!(1433, "sa", "sa", mssql::check));
        m.insert("mysql", module!(3306, "root", "root", mysql::check));
        m.insert("pop3", module!(110, "admin", "admin", pop3::check));
        m.insert("postgres", module!(5432, "postgres", "postgres", postgres::check));
        m.insert("rdp", module!(3389, "Administrator", "", rdp::check));
        m.insert("redis", module!(6379, "default", "", redis::check));
        m.insert("rexec", module!(512, "root", "root", rexec::check));
        m.insert("rlogin", module!(513, "root", "", rlogin::check));
        m.insert("rsh", module!(514, "root", "", rsh::check));
        m.insert("rtsp", module!(554, "admin", "admin", rtsp::check));
        m.insert("smb", module!(445, "Administrator", "", smb::check));
        m.insert("smpp", module!(2775, "smppclient1", "password", smpp::check));
        m.insert("smtp", module!(25, "admin", "admin", smtp::check));
        m.insert("snmp", module!(161, "", "public", snmp::check));
        m.insert("socks5", module!(1080, "admin", "admin", socks5::check));
        m.insert("ssh", module!(22, "root", "123456", ssh::check));
        m.insert("teamspeak", module!(10011, "serveradmin", "password", teamspeak::check));
        m.insert("telnet", module!(23, "admin", "admin", telnet::check));
        m.insert("vault", module!(8200, "admin", "admin", vault::check));
        m.insert("vnc", module!(5900, "", "admin", vnc::check));
        m.insert("winrm", module!(5985, "Administrator", "", winrm::check));
        m.insert("xmpp", module!(5222, "admin", "admin", xmpp::check));
        m
    };
}

/// Module names in sorted order, for help output.
pub fn module_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = MODULES.keys().copied().collect();
    names.sort_unstable();
    names
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_expected_modules() {
        for name in [
            "ssh", "ftp", "smb", "rdp", "vnc", "ldap", "ldaps", "smtp", "imap", "pop3",
            "mysql", "postgres", "mssql", "clickhouse", "mongo", "redis", "telnet",
            "cisco", "rexec", "rlogin", "rsh", "rtsp", "socks5", "snmp", "winrm",
            "vault", "http-basic", "amqp", "etcd", "smpp", "cobaltstrike",
        ] {
            assert!(MODULES.contains_key(name), "missing module {}", name);
        }
        assert_eq!(MODULES["ssh"].default_port, 22);
        assert_eq!(MODULES["vnc"].default_port, 5900);
        assert_eq!(MODULES["etcd"].default_username, "root");
    }

    #[test]
    fn target_addr_brackets_ipv6() {
        let t4 = Target::new("192.0.2.1".parse().unwrap(), 21, "192.0.2.1:21".into());
        assert_eq!(t4.addr(), "192.0.2.1:21");
        let t6 = Target::new("2001:db8::1".parse().unwrap(), 21, "[2001:db8::1]:21".into());
        assert_eq!(t6.addr(), "[2001:db8::1]:21");
    }

    #[test]
    fn original_host_extraction() {
        let t = Target::new("10.0.0.1".parse().unwrap(), 8200, "vault.example.com:8200".into());
        assert_eq!(t.original_host(), "vault.example.com");
        assert_eq!(t.hostname(), Some("vault.example.com"));

        let t = Target::new("10.0.0.1".parse().unwrap(), 8200, "10.0.0.1:8200".into());
        assert_eq!(t.original_host(), "10.0.0.1");
        assert_eq!(t.hostname(), None);

        let t = Target::new("::1".parse().unwrap(), 80, "[::1]:80".into());
        assert_eq!(t.original_host(), "::1");
        assert_eq!(t.hostname(), None);

        let t = Target::new("::1".parse().unwrap(), 80, "2001:db8::2".into());
        assert_eq!(t.original_host(), "2001:db8::2");
        assert_eq!(t.hostname(), None);
    }
}
