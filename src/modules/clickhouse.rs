//! ClickHouse native protocol authentication (port 9000, TLS on 9440).
//! Sends a ClientHello and reads the server's first packet: Hello means the
//! credentials were accepted, Exception with an authentication code
//! (516 AUTHENTICATION_FAILED, 192 UNKNOWN_USER, 193 WRONG_PASSWORD,
//! 194 REQUIRED_PASSWORD) means they were not.

use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::modules::{dial_maybe_tls, AsyncStream, Credential, Target};

const CLIENT_HELLO: u64 = 0;
const SERVER_HELLO: u64 = 0;
const SERVER_EXCEPTION: u64 = 2;
const PROTOCOL_REVISION: u64 = 54460;

const AUTH_CODES: [i32; 4] = [
    516, // AUTHENTICATION_FAILED
    192, // UNKNOWN_USER
    193, // WRONG_PASSWORD
    194, // REQUIRED_PASSWORD
];

fn write_varuint(out: &mut Vec<u8>, mut v: u64) {
    loop {
        let mut byte = (v & 0x7f) as u8;
        v >>= 7;
        if v != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if v == 0 {
            break;
        }
    }
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    write_varuint(out, s.len() as u64);
    out.extend_from_slice(s.as_bytes());
}

pub fn client_hello(username: &str, password: &str) -> Vec<u8> {
    let mut out = Vec::new();
    write_varuint(&mut out, CLIENT_HELLO);
    write_string(&mut out, "netbrute");
    write_varuint(&mut out, 1); // version major
    write_varuint(&mut out, 0); // version minor
    write_varuint(&mut out, PROTOCOL_REVISION);
    write_string(&mut out, "default"); // database
    write_string(&mut out, username);
    write_string(&mut out, password);
    out
}

async fn read_varuint(stream: &mut Box<dyn AsyncStream>) -> Result<u64> {
    let mut v = 0u64;
    let mut shift = 0;
    loop {
        let mut byte = [0u8; 1];
        stream.read_exact(&mut byte).await?;
        v |= ((byte[0] & 0x7f) as u64) << shift;
        if byte[0] & 0x80 == 0 {
            return Ok(v);
        }
        shift += 7;
        if shift > 63 {
            return Err(anyhow!("varuint overflow"));
        }
    }
}

async fn read_string(stream: &mut Box<dyn AsyncStream>) -> Result<String> {
    let len = read_varuint(stream).await? as usize;
    if len > 1 << 20 {
        return Err(anyhow!("oversized string in server packet"));
    }
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).to_string())
}

pub async fn check(
    _token: &CancellationToken,
    dialer: &Dialer,
    _timeout: Duration,
    target: &Target,
    credential: &Credential,
) -> Result<bool> {
    let mut stream = dial_maybe_tls(dialer, target).await?;

    stream
        .write_all(&client_hello(&credential.username, &credential.password))
        .await?;

    match read_varuint(&mut stream).await? {
        SERVER_HELLO => Ok(true),
        SERVER_EXCEPTION => {
            let mut code_buf = [0u8; 4];
            stream.read_exact(&mut code_buf).await?;
            let code = i32::from_le_bytes(code_buf);
            let name = read_string(&mut stream).await.unwrap_or_default();
            if AUTH_CODES.contains(&code) {
                return Ok(false);
            }
            Err(anyhow!("server exception {} ({})", code, name))
        }
        other => Err(anyhow!("unexpected server packet type {}", other)),
    }
}
