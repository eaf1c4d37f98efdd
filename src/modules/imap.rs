//! IMAP LOGIN authentication (RFC 3501). Plain TCP on 143, TLS on 993.

use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::modules::{dial_maybe_tls, Credential, Target};

const TAG: &str = "a001";

/// Quotes an IMAP string literal, escaping backslash and double quote.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '\\' || c == '"' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

pub async fn check(
    _token: &CancellationToken,
    dialer: &Dialer,
    _timeout: Duration,
    target: &Target,
    credential: &Credential,
) -> Result<bool> {
    let stream = dial_maybe_tls(dialer, target).await?;
    let mut stream = BufReader::new(stream);

    let mut greeting = String::new();
    stream.read_line(&mut greeting).await?;
    if !greeting.starts_with("* OK") {
        return Err(anyhow!("unexpected IMAP greeting: {:?}", greeting.trim_end()));
    }

    let cmd = format!(
        "{} LOGIN {} {}\r\n",
        TAG,
        quote(&credential.username),
        quote(&credential.password)
    );
    stream.get_mut().write_all(cmd.as_bytes()).await?;

    // Untagged lines (e.g. "* CAPABILITY") precede the tagged response.
    loop {
        let mut line = String::new();
        let n = stream.read_line(&mut line).await?;
        if n == 0 {
            return Err(anyhow!("IMAP server closed connection before tagged response"));
        }
        if line.starts_with(&format!("{} OK", TAG)) {
            return Ok(true);
        }
        if line.starts_with(&format!("{} NO", TAG)) || line.starts_with(&format!("{} BAD", TAG)) {
            return Ok(false);
        }
    }
}
