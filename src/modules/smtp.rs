//! SMTP AUTH (ports 25 / 587, implicit TLS on 465). Greets, upgrades via
//! STARTTLS when offered on a plaintext connection, then tries AUTH PLAIN
//! and falls back to AUTH LOGIN for servers (Exchange, legacy) that only
//! support the latter.

use std::time::Duration;

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::common::tls;
use crate::modules::{AsyncStream, Credential, Target};

pub async fn check(
    _token: &CancellationToken,
    dialer: &Dialer,
    _timeout: Duration,
    target: &Target,
    credential: &Credential,
) -> Result<bool> {
    let addr = target.addr();

    let mut stream: BufReader<Box<dyn AsyncStream>> = if target.encryption() {
        // implicit TLS (port 465)
        BufReader::new(Box::new(dialer.dial_tls(&addr, &target.sni()).await?))
    } else {
        BufReader::new(Box::new(dialer.dial(&addr).await?))
    };

    let greeting = read_reply(&mut stream).await?;
    if !greeting.starts_with("220") {
        return Err(anyhow!("unexpected SMTP greeting: {:?}", greeting));
    }

    let extensions = command(&mut stream, "EHLO netbrute").await?;

    // Opportunistic STARTTLS on plaintext connections.
    if !target.encryption() && extensions.to_uppercase().contains("STARTTLS") {
        let reply = command(&mut stream, "STARTTLS").await?;
        if reply.starts_with("220") {
            let plain = stream.into_inner();
            let connector = tls::tls_connector();
            let tls_stream = connector.connect(&target.sni(), plain).await?;
            stream = BufReader::new(Box::new(tls_stream));
            // the session resets after the TLS upgrade
            command(&mut stream, "EHLO netbrute").await?;
        }
    }

    // AUTH PLAIN first.
    let token = BASE64.encode(format!(
        "\0{}\0{}",
        credential.username, credential.password
    ));
    let reply = command(&mut stream, &format!("AUTH PLAIN {}", token)).await?;
    if reply.starts_with("235") {
        return Ok(true);
    }
    if is_auth_failure(&reply) {
        return Ok(false);
    }

    // PLAIN failed for a non-auth reason (mechanism unsupported), so try LOGIN.
    let reply = command(&mut stream, "AUTH LOGIN").await?;
    if !reply.starts_with("334") {
        return Err(anyhow!("server rejected AUTH LOGIN: {:?}", reply));
    }
    let reply = command(&mut stream, &BASE64.encode(&credential.username)).await?;
    if !reply.starts_with("334") {
        return if is_auth_failure(&reply) {
            Ok(false)
        } else {
            Err(anyhow!("unexpected LOGIN username reply: {:?}", reply))
        };
    }
    let reply = command(&mut stream, &BASE64.encode(&credential.password)).await?;
    if reply.starts_with("235") {
        return Ok(true);
    }
    if is_auth_failure(&reply) {
        return Ok(false);
    }
    Err(anyhow!("unexpected AUTH reply: {:?}", reply))
}

/// 535/534 or wording variants that mean the credentials were refused.
fn is_auth_failure(reply: &str) -> bool {
    let lower = reply.to_lowercase();
    reply.starts_with("535")
        || reply.starts_with("534")
        || lower.contains("authentication")
        || lower.contains("credentials")
        || lower.contains("invalid")
        || lower.contains("denied")
}

async fn command(
    stream: &mut BufReader<Box<dyn AsyncStream>>,
    cmd: &str,
) -> Result<String> {
    stream
        .get_mut()
        .write_all(format!("{}\r\n", cmd).as_bytes())
        .await?;
    read_reply(stream).await
}

/// Reads one (possibly multiline) SMTP reply, returning all lines joined.
async fn read_reply(stream: &mut BufReader<Box<dyn AsyncStream>>) -> Result<String> {
    let mut reply = String::new();
    loop {
        let mut line = String::new();
        let n = stream.read_line(&mut line).await?;
        if n == 0 {
            return Err(anyhow!("SMTP server closed connection"));
        }
        reply.push_str(&line);
        // continuation lines look like "250-..."; the last is "250 ..."
        if line.len() < 4 || line.as_bytes()[3] != b'-' {
            return Ok(reply);
        }
    }
}
