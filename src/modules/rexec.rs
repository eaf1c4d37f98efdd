//! BSD rexec (port 512). Null-terminated framing:
//! `stderr-port\0 user\0 password\0 command\0`; one response byte,
//! 0x00 = accepted.

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
        "\0\0{}\0{}\0id\0",
        credential.username, credential.password
    );
    conn.write_all(payload.as_bytes()).await?;

    let mut resp = [0u8; 1];
    conn.read_exact(&mut resp).await?;
    Ok(resp[0] == 0x00)
}
