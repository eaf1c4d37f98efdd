//! MongoDB authentication (port 27017). Connects with the driver and lists
//! database names, which requires authentication on locked-down servers.
//! "authentication failed" / "unauthorized" errors are rejections; empty
//! credentials probe for open instances.
//!
//! The driver manages its own connection pool, so the SOCKS5 proxy does not
//! apply to this module.

use std::time::Duration;

use anyhow::Result;
use mongodb::options::{ClientOptions, Credential as MongoCredential, ServerAddress, Tls, TlsOptions};
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::modules::{Credential, Target};

fn is_auth_rejection(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    lower.contains("authentication failed")
        || lower.contains("unauthorized")
        || lower.contains("auth error")
        || lower.contains("scram failure")
        || lower.contains("requires authentication")
}

pub async fn check(
    _token: &CancellationToken,
    _dialer: &Dialer,
    timeout: Duration,
    target: &Target,
    credential: &Credential,
) -> Result<bool> {
    let mut options = ClientOptions::builder()
        .hosts(vec![ServerAddress::Tcp {
            host: target.ip.to_string(),
            port: Some(target.port),
        }])
        .direct_connection(true)
        .connect_timeout(timeout)
        .server_selection_timeout(timeout)
        .build();

    if target.encryption() {
        options.tls = Some(Tls::Enabled(
            TlsOptions::builder()
                .allow_invalid_certificates(true)
                .build(),
        ));
    }

    if !credential.username.is_empty() {
        options.credential = Some(
            MongoCredential::builder()
                .username(credential.username.clone())
                .password(credential.password.clone())
                .source("admin".to_string())
                .build(),
        );
    }

    let client = mongodb::Client::with_options(options)?;

    let result = client.list_database_names().await;
    client.shutdown().await;

    match result {
        Ok(_) => Ok(true),
        Err(e) if is_auth_rejection(&e.to_string()) => Ok(false),
        Err(e) => Err(e.into()),
    }
}
