//! Telnet login prompt state machine. Handles IAC negotiation bytes and the
//! standard Unix login/password prompts; a shell prompt character after the
//! password means the login was accepted.
//!
//! The prompt reader and IAC stripper are shared with the cisco module.

use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::modules::{dial_maybe_tls, AsyncStream, Credential, Target};

const IAC: u8 = 0xFF; // Telnet Interpret As Command

/// Removes IAC (0xFF) negotiation sequences from raw bytes. Sequences are
/// 3 bytes: IAC + command + option; a trailing partial sequence is dropped.
pub fn strip_iac(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] == IAC {
            i += 3;
            continue;
        }
        out.push(data[i]);
        i += 1;
    }
    out
}

/// Reads until any of `prompts` appears (case-insensitive) in the
/// IAC-stripped text. Returns the accumulated text.
pub async fn read_until_prompt(
    stream: &mut Box<dyn AsyncStream>,
    prompts: &[&str],
) -> Result<String> {
    let mut acc: Vec<u8> = Vec::new();
    let mut raw = [0u8; 256];

    loop {
        let n = stream.read(&mut raw).await?;
        if n == 0 {
            anyhow::bail!("connection closed while waiting for prompt");
        }
        acc.extend_from_slice(&strip_iac(&raw[..n]));
        let text = String::from_utf8_lossy(&acc).to_string();
        let lower = text.to_lowercase();
        for p in prompts {
            if lower.contains(&p.to_lowercase()) {
                return Ok(text);
            }
        }
    }
}

pub async fn check(
    _token: &CancellationToken,
    dialer: &Dialer,
    _timeout: Duration,
    target: &Target,
    credential: &Credential,
) -> Result<bool> {
    let mut stream = dial_maybe_tls(dialer, target).await?;

    read_until_prompt(&mut stream, &["login:", "username:", "user:"]).await?;
    stream
        .write_all(format!("{}\r\n", credential.username).as_bytes())
        .await?;

    read_until_prompt(&mut stream, &["password:", "passwd:"]).await?;
    stream
        .write_all(format!("{}\r\n", credential.password).as_bytes())
        .await?;

    let banner =
        read_until_prompt(&mut stream, &["$", "#", ">", "incorrect", "failed", "denied"]).await?;

    Ok(banner.contains('$') || banner.contains('#') || banner.contains('>'))
}
