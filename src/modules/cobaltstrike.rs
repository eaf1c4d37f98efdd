//! Cobalt Strike team server authentication (port 50050). TLS, then a
//! 261-byte frame: magic `00 00 BE EF`, one length byte, password padded to
//! 256 bytes with zeros. A `00 00 CA FE` reply means the password is valid;
//! anything else (including a closed connection) means it is not.
//!
//! The username is unused; the team server takes only a shared password.

use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::modules::{Credential, Target};

const MAGIC_REQUEST: [u8; 4] = [0x00, 0x00, 0xBE, 0xEF];
const MAGIC_REPLY: [u8; 4] = [0x00, 0x00, 0xCA, 0xFE];
const PASSWORD_FIELD: usize = 256;

pub fn auth_packet(password: &str) -> [u8; 261] {
    let mut pkt = [0u8; 261];
    pkt[..4].copy_from_slice(&MAGIC_REQUEST);
    let pw = password.as_bytes();
    // single length byte; the password field itself holds 256 zero-padded bytes
    let len = pw.len().min(u8::MAX as usize).min(PASSWORD_FIELD);
    pkt[4] = len as u8;
    pkt[5..5 + len].copy_from_slice(&pw[..len]);
    pkt
}

pub async fn check(
    _token: &CancellationToken,
    dialer: &Dialer,
    _timeout: Duration,
    target: &Target,
    credential: &Credential,
) -> Result<bool> {
    // Team servers always run TLS with a self-signed cert.
    let mut conn = dialer.dial_tls(&target.addr(), &target.sni()).await?;

    conn.write_all(&auth_packet(&credential.password)).await?;

    let mut reply = [0u8; 4];
    // Wrong password: the server drops the connection without a reply.
    if conn.read_exact(&mut reply).await.is_err() {
        return Ok(false);
    }
    Ok(reply == MAGIC_REPLY)
}
