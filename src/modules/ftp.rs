//! FTP login (port 21). With the target's encryption flag set, upgrades via
//! explicit TLS (AUTH TLS) before logging in; plaintext otherwise. 530 and
//! the usual "login incorrect" wording are rejections.
//!
//! suppaftp manages its own connection, so the SOCKS5 proxy does not apply
//! to this module.

use std::time::Duration;

use anyhow::{anyhow, Result};
use suppaftp::async_native_tls::TlsConnector;
use suppaftp::tokio::{AsyncFtpStream, AsyncNativeTlsConnector, AsyncNativeTlsFtpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::modules::{Credential, Target};

fn is_auth_failure(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    msg.contains("530")
        || lower.contains("login incorrect")
        || lower.contains("authentication failed")
        || (lower.contains("password") && lower.contains("incorrect"))
        || lower.contains("not logged in")
}

pub async fn check(
    _token: &CancellationToken,
    _dialer: &Dialer,
    wait: Duration,
    target: &Target,
    credential: &Credential,
) -> Result<bool> {
    let addr = target.addr();

    if target.encryption() {
        let ftp = timeout(wait, AsyncNativeTlsFtpStream::connect(&addr))
            .await
            .map_err(|_| anyhow!("FTP connect to {} timed out", addr))??;

        let connector = AsyncNativeTlsConnector::from(
            TlsConnector::new()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true),
        );
        let mut ftp = ftp
            .into_secure(connector, &target.sni())
            .await
            .map_err(|e| anyhow!("FTP TLS upgrade: {}", e))?;

        return match ftp.login(&credential.username, &credential.password).await {
            Ok(()) => {
                let _ = ftp.quit().await;
                Ok(true)
            }
            Err(e) if is_auth_failure(&e.to_string()) => Ok(false),
            Err(e) => Err(e.into()),
        };
    }

    let mut ftp = timeout(wait, AsyncFtpStream::connect(&addr))
        .await
        .map_err(|_| anyhow!("FTP connect to {} timed out", addr))??;

    match ftp.login(&credential.username, &credential.password).await {
        Ok(()) => {
            let _ = ftp.quit().await;
            Ok(true)
        }
        Err(e) if is_auth_failure(&e.to_string()) => Ok(false),
        Err(e) => Err(e.into()),
    }
}
