//! HTTP Basic authentication (port 80, TLS on 443). Requests `/` with the
//! credentials; 2xx is a success, 401/403 a rejection.

use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::header::HOST;
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::modules::{Credential, Target};

pub async fn check(
    _token: &CancellationToken,
    dialer: &Dialer,
    _timeout: Duration,
    target: &Target,
    credential: &Credential,
) -> Result<bool> {
    let scheme = if target.encryption() { "https" } else { "http" };
    let url = format!("{}://{}/", scheme, target.addr());

    let mut request = dialer
        .http_client()
        .get(&url)
        .basic_auth(&credential.username, Some(&credential.password));

    if let Some(host) = target.hostname() {
        request = request.header(HOST, host.to_string());
    }

    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(true);
    }
    match status.as_u16() {
        401 | 403 => Ok(false),
        other => Err(anyhow!("unexpected status {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::tests_support::{plain_target, token};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn accepted_credentials() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = plain_target(listener.local_addr().unwrap());

        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = conn.read(&mut buf).await.unwrap();
            let req = String::from_utf8_lossy(&buf[..n]).to_string();
            // base64("admin:admin")
            if req.contains("Basic YWRtaW46YWRtaW4=") {
                conn.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                    .await
                    .unwrap();
            } else {
                conn.write_all(
                    b"HTTP/1.1 401 Unauthorized\r\nWWW-Authenticate: Basic realm=\"x\"\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                )
                .await
                .unwrap();
            }
        });

        let dialer = Dialer::direct(Duration::from_secs(2));
        let ok = check(
            &token(),
            &dialer,
            Duration::from_secs(2),
            &target,
            &Credential::new("admin", "admin"),
        )
        .await
        .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn unauthorized_is_rejection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = plain_target(listener.local_addr().unwrap());

        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = conn.read(&mut buf).await.unwrap();
            conn.write_all(
                b"HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            )
            .await
            .unwrap();
        });

        let dialer = Dialer::direct(Duration::from_secs(2));
        let ok = check(
            &token(),
            &dialer,
            Duration::from_secs(2),
            &target,
            &Credential::new("admin", "bad"),
        )
        .await
        .unwrap();
        assert!(!ok);
    }
}
