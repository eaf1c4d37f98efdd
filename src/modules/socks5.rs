//! SOCKS5 username/password sub-negotiation against a target proxy
//! (RFC 1928 method selection + RFC 1929 auth).

use std::time::Duration;

use anyhow::{anyhow, Result};
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

    // Method selection: propose username/password (0x02).
    conn.write_all(&[0x05, 0x01, 0x02]).await?;

    let mut resp = [0u8; 2];
    conn.read_exact(&mut resp).await?;
    match resp[1] {
        0xFF => return Ok(false), // no acceptable method
        0x02 => {}
        other => return Err(anyhow!("server chose unexpected method 0x{:02x}", other)),
    }

    // Username/password sub-negotiation.
    let user = credential.username.as_bytes();
    let pass = credential.password.as_bytes();
    if user.len() > 255 || pass.len() > 255 {
        return Err(anyhow!("username or password longer than 255 bytes"));
    }

    let mut payload = Vec::with_capacity(3 + user.len() + pass.len());
    payload.push(0x01); // VER
    payload.push(user.len() as u8);
    payload.extend_from_slice(user);
    payload.push(pass.len() as u8);
    payload.extend_from_slice(pass);
    conn.write_all(&payload).await?;

    let mut auth_resp = [0u8; 2];
    conn.read_exact(&mut auth_resp).await?;
    Ok(auth_resp[1] == 0x00)
}
