//! Cached hostname resolution. First answer wins; entries live for the whole
//! run (no persistent state between runs, so no expiry needed).

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use log::debug;

lazy_static::lazy_static! {
    static ref CACHE: Mutex<HashMap<String, IpAddr>> = Mutex::new(HashMap::new());
}

/// Resolves `host` to an IP address. IP literals pass through unchanged.
pub async fn lookup_addr(host: &str) -> Result<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    if let Some(ip) = CACHE.lock().unwrap().get(host) {
        return Ok(*ip);
    }

    let mut addrs = tokio::net::lookup_host((host, 0)).await?;
    let ip = addrs
        .next()
        .map(|sa| sa.ip())
        .ok_or_else(|| anyhow!("no IP addresses found on host {}", host))?;

    debug!("resolved {} to {}", host, ip);
    CACHE.lock().unwrap().entry(host.to_string()).or_insert(ip);
    Ok(ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ip_literals_pass_through() {
        assert_eq!(
            lookup_addr("192.0.2.7").await.unwrap(),
            "192.0.2.7".parse::<IpAddr>().unwrap()
        );
        assert_eq!(
            lookup_addr("::1").await.unwrap(),
            "::1".parse::<IpAddr>().unwrap()
        );
    }

    #[tokio::test]
    async fn localhost_resolves() {
        let ip = lookup_addr("localhost").await.unwrap();
        assert!(ip.is_loopback());
        // second lookup is served from the cache
        assert_eq!(lookup_addr("localhost").await.unwrap(), ip);
    }
}
