//! Microsoft SQL Server authentication (port 1433). TDS login over a
//! dialer-opened stream, then `SELECT 1`. Server error 18456 (login failed)
//! is a rejection.

use std::time::Duration;

use anyhow::Result;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel};
use tokio_util::compat::TokioAsyncWriteCompatExt;
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::modules::{Credential, Target};

const LOGIN_FAILED: u32 = 18456;

pub async fn check(
    _token: &CancellationToken,
    dialer: &Dialer,
    _timeout: Duration,
    target: &Target,
    credential: &Credential,
) -> Result<bool> {
    let mut config = Config::new();
    config.host(target.ip.to_string());
    config.port(target.port);
    config.authentication(AuthMethod::sql_server(
        &credential.username,
        &credential.password,
    ));
    config.trust_cert();
    config.encryption(if target.encryption() {
        EncryptionLevel::Required
    } else {
        EncryptionLevel::NotSupported
    });

    let stream = dialer.dial(&target.addr()).await?;
    stream.set_nodelay(true)?;

    match Client::connect(config, stream.compat_write()).await {
        Ok(mut client) => {
            let _ = client.simple_query("SELECT 1").await;
            Ok(true)
        }
        Err(tiberius::error::Error::Server(e)) if e.code() == LOGIN_FAILED => Ok(false),
        Err(e) => Err(e.into()),
    }
}
