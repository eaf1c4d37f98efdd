//! BSD rsh (port 514). Host-based trust: `stderr-port\0 client-user\0
//! server-user\0 command\0`; a 0x00 response byte means the client is
//! trusted.

use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
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
    let mut conn = dialer.dial(&target.addr()).await?;

    let payload = format!(
        "0\0{}\0{}\0id\0",
        credential.username, credential.username
    );
    conn.write_all(payload.as_bytes()).await?;

    let mut resp = [0u8; 1];
    conn.read_exact(&mut resp).await?;
    Ok(resp[0] == 0x00)
}
