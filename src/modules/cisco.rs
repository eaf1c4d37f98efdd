//! Cisco IOS Telnet login. Devices may ask `Username:` first or jump
//! straight to `Password:`. The enable variant escalates after login and
//! tests the same password against enable mode.

use std::time::Duration;

use anyhow::Result;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::modules::telnet::read_until_prompt;
use crate::modules::{AsyncStream, Credential, Target};

async fn login(
    dialer: &Dialer,
    target: &Target,
    credential: &Credential,
) -> Result<(Box<dyn AsyncStream>, bool)> {
    let mut stream: Box<dyn AsyncStream> = Box::new(dialer.dial(&target.addr()).await?);

    let initial =
        read_until_prompt(&mut stream, &["Username:", "login:", "Password:"]).await?;

    let lower = initial.to_lowercase();
    if lower.contains("username:") || lower.contains("login:") {
        stream
            .write_all(format!("{}\r\n", credential.username).as_bytes())
            .await?;
        read_until_prompt(&mut stream, &["Password:"]).await?;
    }

    stream
        .write_all(format!("{}\r\n", credential.password).as_bytes())
        .await?;

    let banner = read_until_prompt(
        &mut stream,
        &[">", "#", "% Login invalid", "% Bad passwords", "Authentication failed"],
    )
    .await?;

    let ok = banner.contains('>') || banner.contains('#');
    Ok((stream, ok))
}

pub async fn check(
    _token: &CancellationToken,
    dialer: &Dialer,
    _timeout: Duration,
    target: &Target,
    credential: &Credential,
) -> Result<bool> {
    let (_stream, ok) = login(dialer, target, credential).await?;
    Ok(ok)
}

/// Enable-mode variant: after a successful login, sends `enable` and the
/// password again; a `#` prompt means privileged EXEC was reached.
pub async fn check_enable(
    _token: &CancellationToken,
    dialer: &Dialer,
    _timeout: Duration,
    target: &Target,
    credential: &Credential,
) -> Result<bool> {
    let (mut stream, ok) = login(dialer, target, credential).await?;
    if !ok {
        return Ok(false);
    }

    stream.write_all(b"enable\r\n").await?;
    read_until_prompt(&mut stream, &["Password:"]).await?;
    stream
        .write_all(format!("{}\r\n", credential.password).as_bytes())
        .await?;

    let banner =
        read_until_prompt(&mut stream, &["#", "% Bad secrets", "% Access denied"]).await?;
    Ok(banner.contains('#'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::tests_support::{plain_target, token};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn password_only_prompt_path() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = plain_target(listener.local_addr().unwrap());

        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            conn.write_all(b"User Access Verification\r\n\r\nPassword: ")
                .await
                .unwrap();
            let mut buf = [0u8; 128];
            let n = conn.read(&mut buf).await.unwrap();
            if buf[..n].starts_with(b"cisco") {
                conn.write_all(b"\r\nrouter>").await.unwrap();
            } else {
                conn.write_all(b"\r\n% Login invalid\r\n").await.unwrap();
            }
        });

        let dialer = Dialer::direct(Duration::from_secs(2));
        let ok = check(
            &token(),
            &dialer,
            Duration::from_secs(2),
            &target,
            &Credential::new("cisco", "cisco"),
        )
        .await
        .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn username_prompt_path_rejection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = plain_target(listener.local_addr().unwrap());

        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            conn.write_all(b"Username: ").await.unwrap();
            let mut buf = [0u8; 128];
            let _ = conn.read(&mut buf).await.unwrap();
            conn.write_all(b"Password: ").await.unwrap();
            let _ = conn.read(&mut buf).await.unwrap();
            conn.write_all(b"% Login invalid\r\n").await.unwrap();
        });

        let dialer = Dialer::direct(Duration::from_secs(2));
        let ok = check(
            &token(),
            &dialer,
            Duration::from_secs(2),
            &target,
            &Credential::new("admin", "wrong"),
        )
        .await
        .unwrap();
        assert!(!ok);
    }
}
