//! PostgreSQL authentication (port 5432). Connects over a stream the dialer
//! opened (proxy and binding apply), with TLS when the target's encryption
//! flag is set, then runs `SELECT 1`. SQLSTATE 28P01/28000 are rejections.

use std::time::Duration;

use anyhow::{anyhow, Result};
use postgres_native_tls::MakeTlsConnector;
use tokio::net::TcpStream;
use tokio_postgres::error::SqlState;
use tokio_postgres::tls::MakeTlsConnect;
use tokio_postgres::{Config, NoTls};
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::common::tls;
use crate::modules::{Credential, Target};

fn is_auth_rejection(e: &tokio_postgres::Error) -> bool {
    matches!(
        e.code(),
        Some(&SqlState::INVALID_PASSWORD) | Some(&SqlState::INVALID_AUTHORIZATION_SPECIFICATION)
    )
}

pub async fn check(
    _token: &CancellationToken,
    dialer: &Dialer,
    timeout: Duration,
    target: &Target,
    credential: &Credential,
) -> Result<bool> {
    let mut config = Config::new();
    config
        .user(&credential.username)
        .password(&credential.password)
        .dbname("postgres")
        .connect_timeout(timeout);

    let stream = dialer.dial(&target.addr()).await?;

    let client = if target.encryption() {
        let mut make = MakeTlsConnector::new(tls::native_connector());
        let connector =
            MakeTlsConnect::<TcpStream>::make_tls_connect(&mut make, &target.sni())
                .map_err(|e| anyhow!("postgres TLS setup: {}", e))?;
        match config.connect_raw(stream, connector).await {
            Ok((client, connection)) => {
                tokio::spawn(async move {
                    let _ = connection.await;
                });
                client
            }
            Err(e) if is_auth_rejection(&e) => return Ok(false),
            Err(e) => return Err(e.into()),
        }
    } else {
        match config.connect_raw(stream, NoTls).await {
            Ok((client, connection)) => {
                tokio::spawn(async move {
                    let _ = connection.await;
                });
                client
            }
            Err(e) if is_auth_rejection(&e) => return Ok(false),
            Err(e) => return Err(e.into()),
        }
    };

    client.simple_query("SELECT 1").await?;
    Ok(true)
}
