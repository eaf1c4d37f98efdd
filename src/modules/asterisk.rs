//! Asterisk Manager Interface login (port 5038). Text protocol:
//! `Action: Login` with Username/Secret, answered by a `Response:
//! Success|Error` block.

use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
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
    let conn = dialer.dial(&target.addr()).await?;
    let mut stream = BufReader::new(conn);

    let mut greeting = String::new();
    stream.read_line(&mut greeting).await?;
    if !greeting.contains("Asterisk Call Manager") {
        return Err(anyhow!("unexpected AMI greeting: {:?}", greeting.trim_end()));
    }

    let login = format!(
        "Action: Login\r\nUsername: {}\r\nSecret: {}\r\n\r\n",
        credential.username, credential.password
    );
    stream.get_mut().write_all(login.as_bytes()).await?;

    // Response block ends with an empty line.
    loop {
        let mut line = String::new();
        let n = stream.read_line(&mut line).await?;
        if n == 0 {
            return Err(anyhow!("AMI closed connection before login response"));
        }
        let line = line.trim_end();
        if line == "Response: Success" {
            return Ok(true);
        }
        if line == "Response: Error" {
            return Ok(false);
        }
    }
}
