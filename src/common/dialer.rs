//! Outbound connection plumbing shared by every module: direct or SOCKS5
//! dialing, optional local interface binding, connect timeout, TLS wrapping
//! with the shared policy, and a preconfigured HTTP client.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::timeout;
use tokio_native_tls::TlsStream;

use crate::common::iface;
use crate::common::tls;

pub struct Dialer {
    proxy: Option<String>,
    proxy_auth: Option<(String, String)>,
    local_addr: Option<IpAddr>,
    timeout: Duration,
    http: reqwest::Client,
}

impl Dialer {
    /// Builds a dialer. `proxy` is a SOCKS5 `ip:port`, `proxy_auth` is
    /// `username:password` (missing colon is a configuration error).
    /// A missing or address-less interface falls back to OS routing with a
    /// warning; it is never fatal.
    pub fn new(
        proxy: &str,
        proxy_auth: &str,
        iface_name: &str,
        connect_timeout: Duration,
        user_agent: &str,
    ) -> Result<Self> {
        let proxy = if proxy.is_empty() {
            None
        } else {
            debug!("routing connections through SOCKS5 proxy {}", proxy);
            Some(proxy.to_string())
        };

        let proxy_auth = if proxy_auth.is_empty() {
            None
        } else {
            match proxy_auth.split_once(':') {
                Some((user, pass)) => Some((user.to_string(), pass.to_string())),
                None => bail!("invalid proxy auth string, try USERNAME:PASSWORD"),
            }
        };

        let local_addr = if iface_name.is_empty() {
            None
        } else {
            match iface::interface_ipv4(iface_name) {
                Ok(ip) => {
                    debug!("binding outgoing connections to {} ({})", ip, iface_name);
                    Some(ip)
                }
                Err(e) => {
                    warn!("{}; falling back to default routing", e);
                    None
                }
            }
        };

        let http = build_http_client(
            proxy.as_deref(),
            proxy_auth.as_ref(),
            local_addr,
            connect_timeout,
            user_agent,
        )?;

        Ok(Dialer {
            proxy,
            proxy_auth,
            local_addr,
            timeout: connect_timeout,
            http,
        })
    }

    /// A direct dialer with no proxy, no binding and the default User-Agent.
    /// Used by tests.
    #[cfg(test)]
    pub fn direct(connect_timeout: Duration) -> Self {
        Self::new("", "", "", connect_timeout, "netbrute-test").unwrap()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Opens a TCP connection to `addr` (`ip:port`, IPv6 bracketed), through
    /// the proxy when one is configured, under the connect timeout.
    pub async fn dial(&self, addr: &str) -> Result<TcpStream> {
        timeout(self.timeout, self.dial_inner(addr))
            .await
            .map_err(|_| anyhow!("connection to {} timed out", addr))?
    }

    async fn dial_inner(&self, addr: &str) -> Result<TcpStream> {
        if let Some(proxy) = &self.proxy {
            let stream = match &self.proxy_auth {
                Some((user, pass)) => {
                    tokio_socks::tcp::Socks5Stream::connect_with_password(
                        proxy.as_str(),
                        addr,
                        user,
                        pass,
                    )
                    .await?
                }
                None => tokio_socks::tcp::Socks5Stream::connect(proxy.as_str(), addr).await?,
            };
            return Ok(stream.into_inner());
        }

        let sock_addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("invalid address {}", addr))?;

        let socket = match sock_addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        if let Some(ip) = self.local_addr {
            // Only meaningful for v4 targets; v6 targets use default routing.
            if sock_addr.is_ipv4() {
                socket.bind(SocketAddr::new(ip, 0))?;
            }
        }
        Ok(socket.connect(sock_addr).await?)
    }

    /// Dials and performs a TLS client handshake under the same timeout.
    /// `sni` is usually the original hostname; an IP string works too since
    /// the shared policy skips verification.
    pub async fn dial_tls(&self, addr: &str, sni: &str) -> Result<TlsStream<TcpStream>> {
        let stream = self.dial(addr).await?;
        let connector = tls::tls_connector();
        let tls_stream = timeout(self.timeout, connector.connect(sni, stream))
            .await
            .map_err(|_| anyhow!("TLS handshake with {} timed out", addr))??;
        Ok(tls_stream)
    }

    /// The shared HTTP client: custom User-Agent, relaxed TLS, proxy and
    /// local-address binding already applied.
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http
    }
}

fn build_http_client(
    proxy: Option<&str>,
    proxy_auth: Option<&(String, String)>,
    local_addr: Option<IpAddr>,
    connect_timeout: Duration,
    user_agent: &str,
) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

    let mut builder = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .min_tls_version(reqwest::tls::Version::TLS_1_0)
        .user_agent(user_agent)
        .default_headers(headers)
        .timeout(connect_timeout)
        .connect_timeout(connect_timeout)
        .local_address(local_addr);

    if let Some(proxy) = proxy {
        let url = match proxy_auth {
            Some((user, pass)) => format!("socks5://{}:{}@{}", user, pass, proxy),
            None => format!("socks5://{}", proxy),
        };
        builder = builder.proxy(reqwest::Proxy::all(&url)?);
    }

    Ok(builder.build()?)
}
