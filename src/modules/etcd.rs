//! etcd authentication (port 2379). The client performs the Authenticate
//! RPC during connect when a user is set. "authentication failed" /
//! "invalid user" responses are rejections.
//!
//! The gRPC client manages its own connection, so the SOCKS5 proxy does not
//! apply to this module.

use std::time::Duration;

use anyhow::Result;
use etcd_client::{Client, ConnectOptions, TlsOptions};
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::modules::{Credential, Target};

fn is_auth_rejection(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    lower.contains("authentication failed")
        || lower.contains("invalid user id or password")
        || lower.contains("invalid user")
        || lower.contains("permission denied")
}

pub async fn check(
    _token: &CancellationToken,
    _dialer: &Dialer,
    timeout: Duration,
    target: &Target,
    credential: &Credential,
) -> Result<bool> {
    let mut options = ConnectOptions::new()
        .with_user(&credential.username, &credential.password)
        .with_connect_timeout(timeout)
        .with_timeout(timeout);

    let endpoint = if target.encryption() {
        options = options.with_tls(TlsOptions::new());
        format!("https://{}", target.addr())
    } else {
        format!("http://{}", target.addr())
    };

    match Client::connect([endpoint], Some(options)).await {
        Ok(_) => Ok(true),
        Err(e) if is_auth_rejection(&e.to_string()) => Ok(false),
        Err(e) => Err(e.into()),
    }
}
