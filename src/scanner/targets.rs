//! Target parsing and the target feeder.

use std::net::IpAddr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::debug;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

use crate::common::{dns, utils};
use crate::modules::Target;

/// Splits `host[:port]` / `[v6]:port` / bare IPv6 into host and optional
/// port string.
fn split_host_port(s: &str) -> Result<(&str, Option<&str>)> {
    if let Some(rest) = s.strip_prefix('[') {
        // bracketed IPv6, optionally with a port
        let end = rest
            .find(']')
            .ok_or_else(|| anyhow!("unterminated bracket in {:?}", s))?;
        let host = &rest[..end];
        let after = &rest[end + 1..];
        if after.is_empty() {
            return Ok((host, None));
        }
        let port = after
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("unexpected characters after bracket in {:?}", s))?;
        return Ok((host, Some(port)));
    }

    match s.matches(':').count() {
        0 => Ok((s, None)),
        1 => {
            let (host, port) = s.split_once(':').unwrap();
            Ok((host, Some(port)))
        }
        // multiple colons without brackets: a bare IPv6 address
        _ => Ok((s, None)),
    }
}

/// Parses one target line, resolving hostnames through the DNS cache.
/// Ports outside 1..=65535 are rejected.
pub async fn parse_target(line: &str, default_port: u16) -> Result<Arc<Target>> {
    let line = line.trim();
    if line.is_empty() {
        return Err(anyhow!("empty target"));
    }

    let (host, port) = split_host_port(line)?;
    let port = match port {
        Some(p) => {
            let n: u32 = p.parse().map_err(|_| anyhow!("invalid port {:?}", p))?;
            if !(1..=65535).contains(&n) {
                return Err(anyhow!("invalid port number {}, format 1-65535", n));
            }
            n as u16
        }
        None => default_port,
    };

    let ip: IpAddr = dns::lookup_addr(host).await?;
    Ok(Arc::new(Target::new(ip, port, line.to_string())))
}

/// Streams targets from a file of lines (or a single literal) into the
/// bounded channel. Closes the channel when exhausted or cancelled.
pub async fn send_targets(
    token: CancellationToken,
    spec: String,
    default_port: u16,
    tx: Sender<Arc<Target>>,
) {
    if utils::is_file(&spec) {
        for line in utils::load_lines(&spec) {
            let target = match parse_target(&line, default_port).await {
                Ok(t) => t,
                Err(_) => {
                    debug!("can't parse line {} as host or host:port, ignoring", line);
                    continue;
                }
            };
            tokio::select! {
                _ = token.cancelled() => return,
                res = tx.send(target) => {
                    if res.is_err() {
                        return;
                    }
                }
            }
        }
    } else {
        match parse_target(&spec, default_port).await {
            Ok(target) => {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tx.send(target) => {}
                }
            }
            Err(_) => {
                debug!("can't parse target {} as host or host:port, ignoring", spec);
            }
        }
    }
}

/// Estimates how many targets the spec will produce, to scale the host pool
/// down for small inputs.
pub fn estimate_count(spec: &str) -> usize {
    if utils::is_file(spec) {
        utils::count_lines(spec).unwrap_or(1).max(1)
    } else {
        1
    }
}
