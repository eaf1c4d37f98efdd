//! MySQL authentication (port 3306). The blocking driver runs inside
//! `spawn_blocking`; after the handshake a `SELECT 1` confirms the session
//! is usable. Error 1045 (ER_ACCESS_DENIED_ERROR) and friends are
//! rejections.
//!
//! The driver manages its own connection, so the SOCKS5 proxy does not
//! apply to this module.

use std::time::Duration;

use anyhow::Result;
use mysql::prelude::Queryable;
use mysql::{Conn, Opts, OptsBuilder, SslOpts};
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::modules::{Credential, Target};

const ER_ACCESS_DENIED: u16 = 1045;
const ER_DBACCESS_DENIED: u16 = 1044;
const ER_ACCESS_DENIED_NO_PASSWORD: u16 = 1698;

pub async fn check(
    _token: &CancellationToken,
    _dialer: &Dialer,
    timeout: Duration,
    target: &Target,
    credential: &Credential,
) -> Result<bool> {
    let host = target.ip.to_string();
    let port = target.port;
    let username = credential.username.clone();
    let password = credential.password.clone();
    let encryption = target.encryption();

    tokio::task::spawn_blocking(move || {
        let mut builder = OptsBuilder::new()
            .ip_or_hostname(Some(host))
            .tcp_port(port)
            .user(Some(username))
            .pass(Some(password))
            .tcp_connect_timeout(Some(timeout))
            .read_timeout(Some(timeout))
            .write_timeout(Some(timeout));

        if encryption {
            builder = builder.ssl_opts(Some(
                SslOpts::default().with_danger_accept_invalid_certs(true),
            ));
        }

        match Conn::new(Opts::from(builder)) {
            Ok(mut conn) => {
                // cheap probe; permission errors here still mean the login worked
                let _ = conn.query_first::<u8, _>("SELECT 1");
                Ok(true)
            }
            Err(mysql::Error::MySqlError(e))
                if matches!(
                    e.code,
                    ER_ACCESS_DENIED | ER_DBACCESS_DENIED | ER_ACCESS_DENIED_NO_PASSWORD
                ) =>
            {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    })
    .await?
}
