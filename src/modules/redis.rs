//! Redis AUTH over hand-spoken RESP. An empty password probes for servers
//! with no auth configured (PING answered with +PONG); otherwise AUTH
//! followed by a confirming PING. `NOAUTH`/`WRONGPASS`/`invalid username-
//! password pair` responses are rejections.

use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::modules::{dial_maybe_tls, AsyncStream, Credential, Target};

fn resp_command(parts: &[&str]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", parts.len()).into_bytes();
    for p in parts {
        out.extend_from_slice(format!("${}\r\n{}\r\n", p.len(), p).as_bytes());
    }
    out
}

async fn read_line(stream: &mut Box<dyn AsyncStream>) -> Result<String> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(anyhow!("redis server closed connection"));
        }
        if byte[0] == b'\n' {
            break;
        }
        if byte[0] != b'\r' {
            buf.push(byte[0]);
        }
        if buf.len() > 4096 {
            return Err(anyhow!("redis reply line too long"));
        }
    }
    Ok(String::from_utf8_lossy(&buf).to_string())
}

fn is_auth_rejection(reply: &str) -> bool {
    let upper = reply.to_uppercase();
    upper.contains("WRONGPASS")
        || upper.contains("NOAUTH")
        || upper.contains("INVALID USERNAME-PASSWORD PAIR")
        || upper.contains("INVALID PASSWORD")
}

pub async fn check(
    _token: &CancellationToken,
    dialer: &Dialer,
    _timeout: Duration,
    target: &Target,
    credential: &Credential,
) -> Result<bool> {
    let mut stream = dial_maybe_tls(dialer, target).await?;

    if credential.password.is_empty() {
        // No password to try: only meaningful if the server is open.
        stream.write_all(&resp_command(&["PING"])).await?;
        let reply = read_line(&mut stream).await?;
        if reply.starts_with("+PONG") {
            return Ok(true);
        }
        if is_auth_rejection(&reply) {
            return Ok(false);
        }
        return Err(anyhow!("unexpected redis reply: {:?}", reply));
    }

    // ACL-style AUTH with username, except for the default user where the
    // legacy single-argument form works on pre-6.0 servers too.
    let auth = if credential.username.is_empty() || credential.username == "default" {
        resp_command(&["AUTH", &credential.password])
    } else {
        resp_command(&["AUTH", &credential.username, &credential.password])
    };
    stream.write_all(&auth).await?;
    let reply = read_line(&mut stream).await?;

    if !reply.starts_with("+OK") {
        // includes "ERR Client sent AUTH, but no password is set": the server
        // is open, but this credential pair was not what got us in
        if is_auth_rejection(&reply) || reply.to_uppercase().contains("ERR CLIENT SENT AUTH") {
            return Ok(false);
        }
        return Err(anyhow!("unexpected redis AUTH reply: {:?}", reply));
    }

    // Confirm the session really works.
    stream.write_all(&resp_command(&["PING"])).await?;
    let reply = read_line(&mut stream).await?;
    Ok(reply.starts_with("+PONG"))
}
